use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sensor_api::DataRecord;

use crate::LinkError;
use crate::config::{EndpointConfig, ProtocolConfig};
use crate::link::{LinkHandle, LinkStats, ServerLink};
use crate::queue::Merge;
use crate::sink::RecordSink;

/// Итог работы pipeline'а.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownReport {
    /// Записей в sink'е за время работы.
    pub records: u64,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// records/sec
    pub fn rate(&self) -> f64 {
        rate(self.records, self.elapsed)
    }
}

/// Запускает ServerLink'и и сводит их очереди:
///
/// ```text
/// link[i].records ─┐
///                  ├─ Merge → writer queue → [blocking] sink.append()
/// link[j].records ─┘
/// link[i].errors  ─┐
///                  ├─ Merge → tracing
/// link[j].errors  ─┘
/// ```
///
/// Плюс периодический репортёр throughput.
pub struct Orchestrator {
    sink: Arc<RecordSink>,
    token: CancellationToken,
    started: Instant,
    links: Vec<LinkHandle>,
    records_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    diagnostics_task: JoinHandle<()>,
    stats_task: JoinHandle<u64>,
}

/// Ёмкость очереди fan-in → writer. Полная очередь тормозит только
/// fan-in: link'и кладут записи через try_enqueue и не ждут.
const WRITER_QUEUE: usize = 1024;

impl Orchestrator {
    /// Запустить pipeline. Должно вызываться внутри tokio runtime.
    pub fn start(
        endpoints: &[EndpointConfig],
        protocol: &ProtocolConfig,
        sink: Arc<RecordSink>,
        stats_interval: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let started = Instant::now();

        let mut links = Vec::with_capacity(endpoints.len());
        let mut record_queues = Vec::with_capacity(endpoints.len());
        let mut error_queues = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let (link, queues) = ServerLink::new(endpoint.clone(), protocol.clone(), token.child_token());
            record_queues.push(queues.records);
            error_queues.push(queues.errors);
            links.push(link.spawn());
        }

        // Запись в файл (write + fsync) блокирующая: отдельный blocking
        // поток, чтобы не держать async worker'ы и дедлайны link'ов.
        let (write_tx, write_rx) = mpsc::channel(WRITER_QUEUE);
        let records_task = tokio::spawn(forward_records(Merge::new(record_queues), write_tx));
        let writer_sink = sink.clone();
        let writer_task = tokio::task::spawn_blocking(move || write_records(write_rx, &writer_sink));
        let diagnostics_task = tokio::spawn(log_diagnostics(Merge::new(error_queues)));

        let link_stats: Vec<(String, Arc<LinkStats>)> = links
            .iter()
            .map(|l| (l.name().to_string(), l.stats().clone()))
            .collect();
        let stats_task = tokio::spawn(report_stats(
            sink.clone(),
            link_stats,
            started,
            stats_interval,
            token.clone(),
        ));

        tracing::info!(links = links.len(), "data collection started");

        Self {
            sink,
            token,
            started,
            links,
            records_task,
            writer_task,
            diagnostics_task,
            stats_task,
        }
    }

    pub fn links(&self) -> &[LinkHandle] {
        &self.links
    }

    /// Токен остановки: отмена эквивалентна началу shutdown'а
    /// (link'и и репортёр останавливаются, fan-in дочитывает очереди).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// stop links → дождаться, пока fan-in вычитает закрытые очереди →
    /// flush sink → отчёт.
    pub async fn shutdown(self) -> ShutdownReport {
        tracing::info!("shutting down...");
        self.token.cancel();

        for link in self.links {
            link.join().await;
        }
        // Задачи link'ов завершены → их Sender'ы закрыты → Merge вернёт None.
        if let Err(e) = self.records_task.await {
            tracing::error!(error = %e, "record fan-in failed");
        }
        // fan-in завершён → writer queue закрыта → writer дописывает остаток.
        if let Err(e) = self.writer_task.await {
            tracing::error!(error = %e, "record writer failed");
        }
        if let Err(e) = self.diagnostics_task.await {
            tracing::error!(error = %e, "diagnostic fan-in failed");
        }
        match self.stats_task.await {
            Ok(ticks) => tracing::debug!(ticks, "stats reporter finished"),
            Err(e) => tracing::error!(error = %e, "stats reporter failed"),
        }

        let sink = self.sink.clone();
        match tokio::task::spawn_blocking(move || sink.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "error flushing sink"),
            Err(e) => tracing::error!(error = %e, "sink flush task failed"),
        }

        let report = ShutdownReport {
            records: self.sink.count(),
            elapsed: self.started.elapsed(),
        };
        tracing::info!(
            records = report.records,
            elapsed_s = format_args!("{:.1}", report.elapsed.as_secs_f64()),
            rate = format_args!("{:.2}", report.rate()),
            "shutdown complete"
        );
        report
    }
}

async fn forward_records(mut records: Merge<DataRecord>, writer: mpsc::Sender<DataRecord>) {
    while let Some(record) = records.recv().await {
        if writer.send(record).await.is_err() {
            tracing::error!("record writer stopped, fan-in exiting");
            break;
        }
    }
    tracing::debug!("record fan-in finished");
}

/// Blocking consumer: единственный, кто пишет записи в sink.
fn write_records(mut records: mpsc::Receiver<DataRecord>, sink: &RecordSink) {
    while let Some(record) = records.blocking_recv() {
        if let Err(e) = sink.append(&record) {
            tracing::error!(source = %record.source(), error = %e, "error writing record");
        }
    }
    tracing::debug!("record writer finished");
}

async fn log_diagnostics(mut errors: Merge<LinkError>) {
    while let Some(err) = errors.recv().await {
        if err.triggers_reconnect() {
            tracing::error!(link = %err.link(), error = %err, "link error");
        } else {
            tracing::warn!(link = %err.link(), error = %err, "link warning");
        }
    }
    tracing::debug!("diagnostic fan-in finished");
}

async fn report_stats(
    sink: Arc<RecordSink>,
    links: Vec<(String, Arc<LinkStats>)>,
    started: Instant,
    interval: Duration,
    token: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval_at(started + interval, interval);
    let mut ticks = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ticks += 1;
                let records = sink.count();
                let elapsed = started.elapsed();
                tracing::info!(
                    records,
                    rate = format_args!("{:.2}", rate(records, elapsed)),
                    uptime_s = elapsed.as_secs(),
                    "statistics"
                );
                for (name, stats) in &links {
                    let s = stats.snapshot();
                    tracing::info!(
                        link = %name,
                        phase = %s.phase,
                        received = s.received,
                        delivered = s.delivered,
                        dropped = s.dropped,
                        decode_errors = s.decode_errors,
                        reconnects = s.reconnects,
                        "link statistics"
                    );
                }
            }
            _ = token.cancelled() => break,
        }
    }
    ticks
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkConfig;
    use sensor_api::{Reading, timestamp_from_micros};
    use tempfile::TempDir;

    fn open_sink(dir: &TempDir) -> Arc<RecordSink> {
        Arc::new(RecordSink::open(&SinkConfig::default().with_path(dir.path().join("data.log"))).unwrap())
    }

    #[tokio::test]
    async fn test_stats_reporter_ticks_and_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(report_stats(
            open_sink(&dir),
            vec![("server1".to_string(), Arc::new(LinkStats::new()))],
            Instant::now(),
            Duration::from_millis(20),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(!task.is_finished());
        token.cancel();

        let ticks = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reporter ignored cancel")
            .unwrap();
        assert!(ticks >= 2, "ticks = {ticks}");
    }

    #[tokio::test]
    async fn test_stats_reporter_waits_full_interval() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(report_stats(
            open_sink(&dir),
            Vec::new(),
            Instant::now(),
            Duration::from_secs(30),
            token.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        assert_eq!(task.await.unwrap(), 0);
    }

    #[test]
    fn test_writer_drains_queue_in_order() {
        let dir = TempDir::new().unwrap();
        let sink = open_sink(&dir);
        let (tx, rx) = mpsc::channel(8);
        let writer = {
            let sink = sink.clone();
            std::thread::spawn(move || write_records(rx, &sink))
        };
        for i in 0..5 {
            let record = DataRecord {
                timestamp: timestamp_from_micros(i).unwrap(),
                reading: Reading::Motion { x: i as i32, y: 0, z: 0 },
            };
            tx.blocking_send(record).unwrap();
        }
        drop(tx);
        writer.join().unwrap();

        assert_eq!(sink.count(), 5);
        sink.flush().unwrap();
        let content = std::fs::read_to_string(sink.path()).unwrap();
        let xs: Vec<&str> = content.lines().map(|l| l.split(',').nth(2).unwrap()).collect();
        assert_eq!(xs, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(100, Duration::from_secs(4)), 25.0);
        assert_eq!(rate(100, Duration::ZERO), 0.0);

        let report = ShutdownReport { records: 30, elapsed: Duration::from_secs(60) };
        assert_eq!(report.rate(), 0.5);
    }
}
