use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use sensor_api::SourceKind;

use crate::IngestError;

// ═══════════════════════════════════════════════════════════════
//  Protocol Config
// ═══════════════════════════════════════════════════════════════

/// Параметры wire-протокола, общие для всех ServerLink'ов.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Shared secret, отправляется первыми байтами после connect.
    #[serde(default = "default_secret")]
    pub secret: String,
    /// 3-байтовая ASCII команда запроса одной записи.
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Дедлайн чтения ответа. Истечение — не ошибка, а "данных пока нет".
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Пауза перед повторным подключением.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            command: default_command(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl ProtocolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.secret.is_empty() || !self.secret.is_ascii() {
            return Err(IngestError::config("protocol", "secret must be non-empty ASCII"));
        }
        if self.command.len() != COMMAND_LEN || !self.command.is_ascii() {
            return Err(IngestError::config(
                "protocol",
                format!("command must be exactly {COMMAND_LEN} ASCII bytes, got '{}'", self.command),
            ));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(IngestError::config("protocol", "timeouts must be greater than zero"));
        }
        Ok(())
    }
}

const COMMAND_LEN: usize = 3;

fn default_secret() -> String {
    "isu_pt".into()
}
fn default_command() -> String {
    "get".into()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_read_timeout_ms() -> u64 {
    5_000
}
fn default_reconnect_delay_ms() -> u64 {
    2_000
}

// ═══════════════════════════════════════════════════════════════
//  Endpoint Config
// ═══════════════════════════════════════════════════════════════

/// Один удалённый сервер = один ServerLink.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Имя для логов и диагностики (e.g., "server1").
    pub name: String,
    pub address: String,
    pub port: u16,
    /// Layout записей этого сервера.
    pub kind: SourceKind,
    /// Ёмкость очереди записей link → orchestrator. При переполнении
    /// новая запись отбрасывается.
    #[serde(default = "default_record_buffer")]
    pub buffer: usize,
    /// Ёмкость очереди диагностики.
    #[serde(default = "default_error_buffer")]
    pub error_buffer: usize,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            kind,
            buffer: default_record_buffer(),
            error_buffer: default_error_buffer(),
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.name.is_empty() {
            return Err(IngestError::config("endpoint", "name must not be empty"));
        }
        if self.buffer == 0 || self.error_buffer == 0 {
            return Err(IngestError::config(
                "endpoint",
                format!("[{}]: buffer and error_buffer must be greater than zero", self.name),
            ));
        }
        Ok(())
    }
}

fn default_record_buffer() -> usize {
    1000
}
fn default_error_buffer() -> usize {
    10
}

// ═══════════════════════════════════════════════════════════════
//  Sink Config
// ═══════════════════════════════════════════════════════════════

/// Выходной append-only лог.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_path")]
    pub path: PathBuf,
    /// flush + fsync после каждых N записей.
    #[serde(default = "default_flush_every")]
    pub flush_every: u64,
    /// Размер буфера записи в байтах.
    #[serde(default = "default_buffer_bytes")]
    pub buffer_bytes: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: default_sink_path(),
            flush_every: default_flush_every(),
            buffer_bytes: default_buffer_bytes(),
        }
    }
}

impl SinkConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.flush_every == 0 {
            return Err(IngestError::config("sink", "flush_every must be greater than zero"));
        }
        Ok(())
    }
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("data.log")
}
fn default_flush_every() -> u64 {
    100
}
fn default_buffer_bytes() -> usize {
    64 * 1024
}
