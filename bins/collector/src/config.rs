use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use ingest::config::{EndpointConfig, ProtocolConfig, SinkConfig};
use sensor_api::SourceKind;

use crate::error::CollectorError;

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(name = "telemetry-collector", about = "Сбор телеметрии с сенсорных серверов")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сбор данных (до Ctrl+C / SIGTERM)
    Run(RunArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Путь к TOML конфиг файлу. Если файла нет — встроенные значения
    #[arg(long, default_value = "collector.toml", env = "COLLECTOR_CONFIG")]
    pub config: String,

    /// Выходной лог (перекрывает [sink].path)
    #[arg(long, env = "COLLECTOR_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Интервал статистики в секундах (перекрывает stats_interval_secs)
    #[arg(long)]
    pub stats_interval: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_servers")]
    pub servers: Vec<EndpointConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            sink: SinkConfig::default(),
            stats_interval_secs: default_stats_interval_secs(),
            servers: default_servers(),
        }
    }
}

fn default_stats_interval_secs() -> u64 {
    30
}

fn default_servers() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::new("server1", "95.163.237.76", 5123, SourceKind::Server1),
        EndpointConfig::new("server2", "95.163.237.76", 5124, SourceKind::Server2),
    ]
}

impl CollectorConfig {
    pub fn load(path: &str) -> Result<Self, CollectorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CollectorError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        toml::from_str(&content)
            .map_err(|e| CollectorError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    /// config file < CLI/env. Отсутствующий файл — не ошибка.
    pub fn resolve(args: &RunArgs) -> Result<Self, CollectorError> {
        let mut cfg = if Path::new(&args.config).exists() {
            Self::load(&args.config)?
        } else {
            tracing::info!(config = %args.config, "config file not found, using defaults");
            Self::default()
        };

        if let Some(output) = &args.output {
            cfg.sink.path = output.clone();
        }
        if let Some(secs) = args.stats_interval {
            cfg.stats_interval_secs = secs;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.servers.is_empty() {
            return Err(CollectorError::Config { context: "servers", detail: "no [[servers]] configured".into() });
        }
        if self.stats_interval_secs == 0 {
            return Err(CollectorError::Config {
                context: "stats",
                detail: "stats_interval_secs must be greater than zero".into(),
            });
        }
        self.protocol.validate()?;
        self.sink.validate()?;
        for server in &self.servers {
            server.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(config: &Path) -> RunArgs {
        RunArgs {
            config: config.to_string_lossy().into_owned(),
            output: None,
            stats_interval: None,
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = CollectorConfig::resolve(&args(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.servers.len(), 2);
        assert_eq!(cfg.servers[0].port, 5123);
        assert_eq!(cfg.servers[1].kind, SourceKind::Server2);
        assert_eq!(cfg.sink.path, PathBuf::from("data.log"));
        assert_eq!(cfg.stats_interval_secs, 30);
    }

    #[test]
    fn test_file_and_cli_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(
            &path,
            r#"
stats_interval_secs = 5

[protocol]
read_timeout_ms = 250

[sink]
path = "from-file.log"

[[servers]]
name = "lab"
address = "10.0.0.7"
port = 7000
kind = "server2"
buffer = 32
"#,
        )
        .unwrap();

        let mut a = args(&path);
        a.output = Some(PathBuf::from("from-cli.log"));
        let cfg = CollectorConfig::resolve(&a).unwrap();

        assert_eq!(cfg.stats_interval_secs, 5);
        assert_eq!(cfg.protocol.read_timeout_ms, 250);
        assert_eq!(cfg.protocol.command, "get");
        assert_eq!(cfg.sink.path, PathBuf::from("from-cli.log"));
        assert_eq!(cfg.servers.len(), 1);
        assert_eq!(cfg.servers[0].buffer, 32);
        assert_eq!(cfg.servers[0].error_buffer, 10);
    }

    #[test]
    fn test_invalid_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(&path, "servers = 5").unwrap();
        assert!(matches!(
            CollectorConfig::resolve(&args(&path)),
            Err(CollectorError::Config { context: "parse", .. })
        ));
    }

    #[test]
    fn test_bad_command_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(&path, "[protocol]\ncommand = \"fetch\"\n").unwrap();
        assert!(matches!(CollectorConfig::resolve(&args(&path)), Err(CollectorError::Ingest(_))));
    }
}
