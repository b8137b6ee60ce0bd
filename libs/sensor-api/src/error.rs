use crate::types::SourceKind;

/// Ошибка декодирования одной записи. Запись отбрасывается,
/// соединение не рвётся.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("insufficient data for {kind} record: got {actual} bytes, expected {expected}")]
    InsufficientData {
        kind: SourceKind,
        expected: usize,
        actual: usize,
    },

    #[error("checksum mismatch: computed {computed}, received {received}")]
    ChecksumMismatch { computed: u8, received: u8 },

    #[error("timestamp out of range: {0}us")]
    TimestampOutOfRange(i64),
}
