mod error;
mod rng;
mod server;
mod walk;

use clap::Parser;
use error::SimError;
use sensor_api::SourceKind;

#[derive(Parser)]
#[command(name = "sensor-sim", about = "Эмулятор сенсорного сервера (secret + command → запись)")]
struct Cli {
    /// Адрес для прослушивания
    #[arg(long, default_value = "127.0.0.1:5123", env = "SENSOR_SIM_LISTEN")]
    listen: String,

    /// Layout записей: server1 (climate) или server2 (motion)
    #[arg(long, value_parser = parse_kind, default_value = "server1")]
    kind: SourceKind,

    /// Секрет, который клиент должен прислать первым
    #[arg(long, default_value = "isu_pt")]
    secret: String,

    /// Команда опроса (3 байта)
    #[arg(long, default_value = "get")]
    command: String,

    /// Вероятность не ответить на команду [0, 1)
    #[arg(long, default_value_t = 0.0)]
    idle: f64,

    /// Seed для PRNG (0 = текущее время)
    #[arg(long, default_value_t = 0)]
    seed: i64,
}

fn parse_kind(s: &str) -> Result<SourceKind, String> {
    match s {
        "server1" => Ok(SourceKind::Server1),
        "server2" => Ok(SourceKind::Server2),
        other => Err(format!("unknown kind '{other}', expected server1 or server2")),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SimError> {
    let opts = server::SimOptions {
        kind: cli.kind,
        secret: cli.secret.into_bytes(),
        command: cli.command.into_bytes(),
        idle: cli.idle,
        seed: cli.seed,
    };
    opts.validate()?;

    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .map_err(|source| SimError::Bind { addr: cli.listen.clone(), source })?;

    tokio::select! {
        r = server::serve(listener, opts) => r,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
