use std::io;
use std::path::PathBuf;

use sensor_api::DecodeError;

/// Диагностика ServerLink'а. Передаётся через очередь ошибок,
/// процесс не останавливает.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("[{link}] connection error: {source}")]
    Connect { link: String, source: io::Error },

    #[error("[{link}] failed to send secret key: {source}")]
    Auth { link: String, source: io::Error },

    #[error("[{link}] failed to send command: {source}")]
    Send { link: String, source: io::Error },

    #[error("[{link}] connection closed by server")]
    ConnectionClosed { link: String },

    #[error("[{link}] read error: {source}")]
    Read { link: String, source: io::Error },

    #[error("[{link}] incomplete record: got {got} bytes, expected {expected}")]
    IncompleteRecord { link: String, got: usize, expected: usize },

    #[error("[{link}] parse error: {source}")]
    Decode { link: String, source: DecodeError },

    #[error("[{link}] record queue full, dropping record")]
    RecordDropped { link: String },
}

impl LinkError {
    pub fn link(&self) -> &str {
        match self {
            LinkError::Connect { link, .. }
            | LinkError::Auth { link, .. }
            | LinkError::Send { link, .. }
            | LinkError::ConnectionClosed { link }
            | LinkError::Read { link, .. }
            | LinkError::IncompleteRecord { link, .. }
            | LinkError::Decode { link, .. }
            | LinkError::RecordDropped { link } => link,
        }
    }

    /// Connection-level ошибка: link закрывает соединение и переподключается.
    /// Остальные (decode, incomplete, drop) — polling продолжается.
    pub fn triggers_reconnect(&self) -> bool {
        matches!(
            self,
            LinkError::Connect { .. }
                | LinkError::Auth { .. }
                | LinkError::Send { .. }
                | LinkError::ConnectionClosed { .. }
                | LinkError::Read { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("write: {0}")]
    Io(#[from] io::Error),

    #[error("sink is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },
}

impl IngestError {
    pub fn config(context: &'static str, detail: impl Into<String>) -> Self {
        IngestError::Config { context, detail: detail.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_classification() {
        let closed = LinkError::ConnectionClosed { link: "server1".into() };
        assert!(closed.triggers_reconnect());
        assert_eq!(closed.link(), "server1");

        let decode = LinkError::Decode {
            link: "server2".into(),
            source: DecodeError::ChecksumMismatch { computed: 1, received: 2 },
        };
        assert!(!decode.triggers_reconnect());
        assert_eq!(decode.to_string(), "[server2] parse error: checksum mismatch: computed 1, received 2");

        let dropped = LinkError::RecordDropped { link: "server1".into() };
        assert!(!dropped.triggers_reconnect());
    }
}
