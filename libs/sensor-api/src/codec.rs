//! Бинарный layout записей.
//!
//! Все многобайтовые поля — big-endian (network byte order):
//!
//! ```text
//! server1: ts:i64 | temperature:f32 | pressure:i16 | checksum:u8   (15 bytes)
//! server2: ts:i64 | x:i32 | y:i32 | z:i32            | checksum:u8   (21 bytes)
//! ```
//!
//! `ts` — микросекунды от Unix epoch, знаковые. `checksum` — сумма всех
//! предыдущих байтов записи по модулю 256.

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::types::{DataRecord, Reading, SourceKind};

const MICROS_PER_SEC: i64 = 1_000_000;
const NANOS_PER_MICRO: i64 = 1_000;

/// 8-битная сумма с переполнением.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Декодировать запись указанного типа из начала буфера.
///
/// Байты сверх `kind.record_size()` игнорируются.
pub fn decode(kind: SourceKind, data: &[u8]) -> Result<DataRecord, DecodeError> {
    let size = kind.record_size();
    if data.len() < size {
        return Err(DecodeError::InsufficientData {
            kind,
            expected: size,
            actual: data.len(),
        });
    }

    let (body, tail) = data[..size].split_at(size - 1);
    let computed = checksum(body);
    let received = tail[0];
    if computed != received {
        return Err(DecodeError::ChecksumMismatch { computed, received });
    }

    let timestamp = timestamp_from_micros(i64::from_be_bytes(field(body, 0)))?;

    let reading = match kind {
        SourceKind::Server1 => Reading::Climate {
            temperature: f32::from_bits(u32::from_be_bytes(field(body, 8))),
            pressure: i16::from_be_bytes(field(body, 12)),
        },
        SourceKind::Server2 => Reading::Motion {
            x: i32::from_be_bytes(field(body, 8)),
            y: i32::from_be_bytes(field(body, 12)),
            z: i32::from_be_bytes(field(body, 16)),
        },
    };

    Ok(DataRecord { timestamp, reading })
}

/// Закодировать запись в wire-формат (с контрольной суммой).
pub fn encode(record: &DataRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(record.source().record_size());
    buf.extend_from_slice(&record.timestamp.timestamp_micros().to_be_bytes());

    match record.reading {
        Reading::Climate { temperature, pressure } => {
            buf.extend_from_slice(&temperature.to_bits().to_be_bytes());
            buf.extend_from_slice(&pressure.to_be_bytes());
        }
        Reading::Motion { x, y, z } => {
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
            buf.extend_from_slice(&z.to_be_bytes());
        }
    }

    buf.push(checksum(&buf));
    buf
}

/// Микросекунды от epoch → момент времени.
///
/// Деление с округлением вниз: остаток всегда в `[0, 1_000_000)`,
/// поэтому `-1` — это ровно 1µs до epoch.
pub fn timestamp_from_micros(micros: i64) -> Result<DateTime<Utc>, DecodeError> {
    let secs = micros.div_euclid(MICROS_PER_SEC);
    let nanos = (micros.rem_euclid(MICROS_PER_SEC) * NANOS_PER_MICRO) as u32;
    DateTime::from_timestamp(secs, nanos).ok_or(DecodeError::TimestampOutOfRange(micros))
}

fn field<const N: usize>(body: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&body[offset..offset + N]);
    out
}
