use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sensor_api::{DataRecord, Reading};

use crate::SinkError;
use crate::config::SinkConfig;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only текстовый лог записей. Одна строка на запись:
///
/// ```text
/// 2024-01-15 10:30:45,server1,25.500000,1013
/// 2024-01-15 10:30:45,server2,-12,400,98
/// ```
///
/// Все операции сериализованы мьютексом: строки не перемешиваются,
/// счётчик точный. Каждые `flush_every` записей — flush + fsync.
pub struct RecordSink {
    path: PathBuf,
    flush_every: u64,
    inner: Mutex<SinkState>,
}

struct SinkState {
    /// `None` после close().
    writer: Option<BufWriter<File>>,
    count: u64,
    line: String,
}

impl RecordSink {
    pub fn open(config: &SinkConfig) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .map_err(|source| SinkError::Open { path: config.path.clone(), source })?;

        tracing::info!(path = %config.path.display(), flush_every = config.flush_every, "sink opened");

        Ok(Self {
            path: config.path.clone(),
            flush_every: config.flush_every.max(1),
            inner: Mutex::new(SinkState {
                writer: Some(BufWriter::with_capacity(config.buffer_bytes, file)),
                count: 0,
                line: String::with_capacity(64),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &DataRecord) -> Result<(), SinkError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let writer = state.writer.as_mut().ok_or(SinkError::Closed)?;

        state.line.clear();
        format_line(record, &mut state.line);
        writer.write_all(state.line.as_bytes())?;

        state.count += 1;
        if state.count % self.flush_every == 0 {
            flush_and_sync(writer)?;
        }
        Ok(())
    }

    /// flush + fsync. После close() — no-op.
    pub fn flush(&self) -> Result<(), SinkError> {
        let mut state = self.lock();
        if let Some(writer) = state.writer.as_mut() {
            flush_and_sync(writer)?;
        }
        Ok(())
    }

    /// flush + fsync + закрыть файл. Повторный вызов — no-op.
    pub fn close(&self) -> Result<(), SinkError> {
        let mut state = self.lock();
        if let Some(mut writer) = state.writer.take() {
            flush_and_sync(&mut writer)?;
            tracing::info!(path = %self.path.display(), records = state.count, "sink closed");
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.lock().count
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn flush_and_sync(writer: &mut BufWriter<File>) -> Result<(), SinkError> {
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Сформировать строку лога (с `\n`) для записи.
pub fn format_line(record: &DataRecord, out: &mut String) {
    let ts = record.timestamp.format(TIMESTAMP_FORMAT);
    let source = record.source();
    // Запись в String не может завершиться ошибкой.
    let _ = match record.reading {
        Reading::Climate { temperature, pressure } => {
            writeln!(out, "{ts},{source},{temperature:.6},{pressure}")
        }
        Reading::Motion { x, y, z } => writeln!(out, "{ts},{source},{x},{y},{z}"),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_api::timestamp_from_micros;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn climate(micros: i64, temperature: f32, pressure: i16) -> DataRecord {
        DataRecord {
            timestamp: timestamp_from_micros(micros).unwrap(),
            reading: Reading::Climate { temperature, pressure },
        }
    }

    fn motion(micros: i64, x: i32, y: i32, z: i32) -> DataRecord {
        DataRecord {
            timestamp: timestamp_from_micros(micros).unwrap(),
            reading: Reading::Motion { x, y, z },
        }
    }

    fn open_in(dir: &TempDir) -> RecordSink {
        RecordSink::open(&SinkConfig::default().with_path(dir.path().join("data.log"))).unwrap()
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_format_climate_line() {
        let mut line = String::new();
        format_line(&climate(1_705_314_645_500_000, 25.5, 1013), &mut line);
        assert_eq!(line, "2024-01-15 10:30:45,server1,25.500000,1013\n");
    }

    #[test]
    fn test_format_motion_line() {
        let mut line = String::new();
        format_line(&motion(0, -12, 400, i32::MIN), &mut line);
        assert_eq!(line, "1970-01-01 00:00:00,server2,-12,400,-2147483648\n");
    }

    #[test]
    fn test_format_before_epoch() {
        let mut line = String::new();
        format_line(&motion(-1, 0, 0, 0), &mut line);
        assert_eq!(line, "1969-12-31 23:59:59,server2,0,0,0\n");
    }

    #[test]
    fn test_concurrent_appends_are_exact() {
        let dir = TempDir::new().unwrap();
        let sink = open_in(&dir);

        std::thread::scope(|s| {
            for t in 0..5i32 {
                let sink = &sink;
                s.spawn(move || {
                    for i in 0..50i32 {
                        let record = if t % 2 == 0 {
                            climate(1_000_000, 1.0, (t * 100 + i) as i16)
                        } else {
                            motion(1_000_000, t, i, t * 100 + i)
                        };
                        sink.append(&record).unwrap();
                    }
                });
            }
        });

        assert_eq!(sink.count(), 250);
        sink.flush().unwrap();

        let lines = read_lines(sink.path());
        assert_eq!(lines.len(), 250);

        let mut expected = HashSet::new();
        for t in 0..5i32 {
            for i in 0..50i32 {
                let line = if t % 2 == 0 {
                    format!("1970-01-01 00:00:01,server1,1.000000,{}", t * 100 + i)
                } else {
                    format!("1970-01-01 00:00:01,server2,{t},{i},{}", t * 100 + i)
                };
                expected.insert(line);
            }
        }
        let actual: HashSet<String> = lines.into_iter().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_every_hundredth_append_syncs() {
        let dir = TempDir::new().unwrap();
        let sink = open_in(&dir);

        for i in 0..99 {
            sink.append(&climate(0, 0.0, i)).unwrap();
        }
        // 99 строк ещё в буфере.
        assert_eq!(std::fs::metadata(sink.path()).unwrap().len(), 0);

        sink.append(&climate(0, 0.0, 99)).unwrap();
        assert_eq!(read_lines(sink.path()).len(), 100);

        sink.append(&climate(0, 0.0, 100)).unwrap();
        assert_eq!(read_lines(sink.path()).len(), 100);
    }

    #[test]
    fn test_flush_without_new_records_is_safe() {
        let dir = TempDir::new().unwrap();
        let sink = open_in(&dir);
        sink.flush().unwrap();
        sink.append(&motion(0, 1, 2, 3)).unwrap();
        sink.flush().unwrap();
        sink.flush().unwrap();
        assert_eq!(read_lines(sink.path()).len(), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_appends() {
        let dir = TempDir::new().unwrap();
        let sink = open_in(&dir);
        sink.append(&motion(0, 1, 2, 3)).unwrap();

        sink.close().unwrap();
        sink.close().unwrap();
        sink.flush().unwrap();

        assert!(matches!(sink.append(&motion(0, 1, 2, 3)), Err(SinkError::Closed)));
        assert_eq!(sink.count(), 1);
        assert_eq!(read_lines(sink.path()).len(), 1);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let sink = open_in(&dir);
        sink.append(&motion(0, 1, 1, 1)).unwrap();
        sink.append(&motion(0, 2, 2, 2)).unwrap();
        sink.close().unwrap();

        let sink = open_in(&dir);
        assert_eq!(sink.count(), 0);
        sink.append(&motion(0, 3, 3, 3)).unwrap();
        sink.close().unwrap();

        let lines = read_lines(sink.path());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "1970-01-01 00:00:00,server2,3,3,3");
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let cfg = SinkConfig::default().with_path(dir.path().join("missing").join("data.log"));
        assert!(matches!(RecordSink::open(&cfg), Err(SinkError::Open { .. })));
    }
}
