use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Source kind
// ════════════════════════════════════════════════════════════════

/// timestamp + temperature + pressure + checksum
pub const SERVER1_RECORD_SIZE: usize = 8 + 4 + 2 + 1;
/// timestamp + x + y + z + checksum
pub const SERVER2_RECORD_SIZE: usize = 8 + 4 + 4 + 4 + 1;
/// Максимальный размер записи среди всех вариантов (размер буфера чтения).
pub const MAX_RECORD_SIZE: usize = SERVER2_RECORD_SIZE;

/// Тип удалённого сервера. Определяет бинарный layout записи на проводе.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Температура (float32) + давление (int16).
    Server1,
    /// Трёхосевое показание x/y/z (int32).
    Server2,
}

impl SourceKind {
    /// Фиксированный размер записи на проводе, включая байт контрольной суммы.
    pub const fn record_size(self) -> usize {
        match self {
            SourceKind::Server1 => SERVER1_RECORD_SIZE,
            SourceKind::Server2 => SERVER2_RECORD_SIZE,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SourceKind::Server1 => "server1",
            SourceKind::Server2 => "server2",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ════════════════════════════════════════════════════════════════
//  Decoded record
// ════════════════════════════════════════════════════════════════

/// Полезная нагрузка записи, зависит от типа источника.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Climate { temperature: f32, pressure: i16 },
    Motion { x: i32, y: i32, z: i32 },
}

impl Reading {
    pub const fn kind(&self) -> SourceKind {
        match self {
            Reading::Climate { .. } => SourceKind::Server1,
            Reading::Motion { .. } => SourceKind::Server2,
        }
    }
}

/// Декодированная запись одного сервера.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRecord {
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

impl DataRecord {
    pub const fn source(&self) -> SourceKind {
        self.reading.kind()
    }
}
