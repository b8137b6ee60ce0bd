use std::net::SocketAddr;

use sensor_api::{SourceKind, encode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::SimError;
use crate::rng::Rng;
use crate::walk::Walk;

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub kind: SourceKind,
    pub secret: Vec<u8>,
    pub command: Vec<u8>,
    /// Вероятность промолчать в ответ на команду.
    pub idle: f64,
    pub seed: i64,
}

impl SimOptions {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.secret.is_empty() {
            return Err(SimError::Option("secret must not be empty".into()));
        }
        if self.command.len() != 3 {
            return Err(SimError::Option("command must be exactly 3 bytes".into()));
        }
        if !(0.0..1.0).contains(&self.idle) {
            return Err(SimError::Option(format!("idle must be in [0, 1), got {}", self.idle)));
        }
        Ok(())
    }
}

/// Accept loop: по задаче на соединение, своё блуждание у каждого.
pub async fn serve(listener: TcpListener, opts: SimOptions) -> Result<(), SimError> {
    tracing::info!(
        addr = %listener.local_addr()?,
        kind = %opts.kind,
        idle = opts.idle,
        "sensor simulator listening"
    );

    let mut conn_seq: i64 = 0;
    loop {
        let (stream, peer) = listener.accept().await?;
        conn_seq += 1;
        let opts = opts.clone();
        // Разные соединения с фиксированным seed не должны совпадать.
        let seed = if opts.seed == 0 { 0 } else { opts.seed.wrapping_add(conn_seq) };
        tokio::spawn(async move {
            match handle(stream, &opts, Rng::new(seed)).await {
                Ok(sent) => tracing::info!(%peer, sent, "client disconnected"),
                Err(e) => tracing::warn!(%peer, error = %e, "connection error"),
            }
        });
    }
}

/// Возвращает число отправленных записей.
async fn handle(mut stream: TcpStream, opts: &SimOptions, mut rng: Rng) -> std::io::Result<u64> {
    let peer: Option<SocketAddr> = stream.peer_addr().ok();

    let mut secret = vec![0u8; opts.secret.len()];
    stream.read_exact(&mut secret).await?;
    if secret != opts.secret {
        tracing::warn!(?peer, "bad secret, closing");
        return Ok(0);
    }
    tracing::info!(?peer, "client authenticated");

    let mut walk = Walk::new(opts.kind);
    let mut command = vec![0u8; opts.command.len()];
    let mut sent = 0u64;
    loop {
        match stream.read_exact(&mut command).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(sent),
            Err(e) => return Err(e),
        }
        if command != opts.command {
            tracing::warn!(?peer, "unknown command, closing");
            return Ok(sent);
        }

        walk.tick(&mut rng);
        if rng.chance(opts.idle) {
            tracing::debug!(?peer, "staying idle");
            continue;
        }
        stream.write_all(&encode(&walk.record())).await?;
        sent += 1;
    }
}
