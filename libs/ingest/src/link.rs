use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sensor_api::{DataRecord, MAX_RECORD_SIZE, decode};

use crate::LinkError;
use crate::config::{EndpointConfig, ProtocolConfig};
use crate::queue::{Enqueue, try_enqueue};

// ═══════════════════════════════════════════════════════════════
//  State machine
// ═══════════════════════════════════════════════════════════════

/// Состояние ServerLink'а. Соединение живёт внутри состояния:
/// переход в `Disconnected` его закрывает.
///
/// ```text
/// Connecting → Authenticated → Polling ⟲ → Disconnected → Connecting …
///      └────────────→ Disconnected
/// any ──(cancel)──→ Stopped
/// ```
#[derive(Debug)]
pub enum LinkState {
    /// Ожидание reconnect delay.
    Disconnected,
    Connecting,
    /// Соединение открыто, secret отправлен.
    Authenticated(TcpStream),
    Polling(TcpStream),
    Stopped,
}

impl LinkState {
    pub fn phase(&self) -> LinkPhase {
        match self {
            LinkState::Disconnected => LinkPhase::Disconnected,
            LinkState::Connecting => LinkPhase::Connecting,
            LinkState::Authenticated(_) => LinkPhase::Authenticated,
            LinkState::Polling(_) => LinkPhase::Polling,
            LinkState::Stopped => LinkPhase::Stopped,
        }
    }
}

/// Имя состояния без соединения внутри — для статистики и логов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkPhase {
    Disconnected = 0,
    Connecting = 1,
    Authenticated = 2,
    Polling = 3,
    Stopped = 4,
}

impl LinkPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LinkPhase::Disconnected,
            1 => LinkPhase::Connecting,
            2 => LinkPhase::Authenticated,
            3 => LinkPhase::Polling,
            _ => LinkPhase::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkPhase::Disconnected => "disconnected",
            LinkPhase::Connecting => "connecting",
            LinkPhase::Authenticated => "authenticated",
            LinkPhase::Polling => "polling",
            LinkPhase::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Stats
// ═══════════════════════════════════════════════════════════════

/// Счётчики одного link'а. Пишет только задача link'а, читают все.
#[derive(Debug)]
pub struct LinkStats {
    received: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    decode_errors: AtomicU64,
    reconnects: AtomicU64,
    phase: AtomicU8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    /// Полных записей прочитано с провода.
    pub received: u64,
    /// Поставлено в очередь записей.
    pub delivered: u64,
    /// Отброшено из-за полной очереди.
    pub dropped: u64,
    pub decode_errors: u64,
    pub reconnects: u64,
    pub phase: LinkPhase,
}

impl LinkStats {
    pub(crate) fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            phase: AtomicU8::new(LinkPhase::Connecting as u8),
        }
    }

    pub fn phase(&self) -> LinkPhase {
        LinkPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            phase: self.phase(),
        }
    }

    fn set_phase(&self, phase: LinkPhase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════
//  ServerLink
// ═══════════════════════════════════════════════════════════════

/// Выходные очереди одного link'а. Закрываются, когда задача link'а
/// завершилась.
pub struct LinkQueues {
    pub records: mpsc::Receiver<DataRecord>,
    pub errors: mpsc::Receiver<LinkError>,
}

/// Клиент одного удалённого сервера: connect → secret → (command → read
/// → decode → enqueue)* → reconnect.
pub struct ServerLink {
    endpoint: EndpointConfig,
    protocol: ProtocolConfig,
    records: mpsc::Sender<DataRecord>,
    errors: mpsc::Sender<LinkError>,
    token: CancellationToken,
    stats: Arc<LinkStats>,
    buf: [u8; MAX_RECORD_SIZE],
}

impl ServerLink {
    pub fn new(
        endpoint: EndpointConfig,
        protocol: ProtocolConfig,
        token: CancellationToken,
    ) -> (Self, LinkQueues) {
        let (records_tx, records_rx) = mpsc::channel(endpoint.buffer.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(endpoint.error_buffer.max(1));
        let link = Self {
            endpoint,
            protocol,
            records: records_tx,
            errors: errors_tx,
            token,
            stats: Arc::new(LinkStats::new()),
            buf: [0u8; MAX_RECORD_SIZE],
        };
        (link, LinkQueues { records: records_rx, errors: errors_rx })
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    /// Запустить link в отдельной задаче.
    pub fn spawn(self) -> LinkHandle {
        let name = self.endpoint.name.clone();
        let token = self.token.clone();
        let stats = self.stats();
        let task = tokio::spawn(self.run());
        LinkHandle { name, token, stats, task }
    }

    /// Крутить state machine до `Stopped`.
    pub async fn run(mut self) {
        tracing::info!(
            link = %self.endpoint.name,
            addr = %self.endpoint.address,
            port = self.endpoint.port,
            kind = %self.endpoint.kind,
            "link starting"
        );
        let mut state = LinkState::Connecting;
        self.stats.set_phase(state.phase());
        while !matches!(state, LinkState::Stopped) {
            state = self.step(state).await;
        }
        tracing::info!(link = %self.endpoint.name, "link stopped");
    }

    /// Один переход state machine. Отмена проверяется до перехода и
    /// на каждом ожидании внутри него.
    pub async fn step(&mut self, state: LinkState) -> LinkState {
        let next = if self.token.is_cancelled() {
            LinkState::Stopped
        } else {
            match state {
                LinkState::Disconnected => self.wait_reconnect().await,
                LinkState::Connecting => self.connect().await,
                LinkState::Authenticated(stream) => {
                    tracing::info!(link = %self.endpoint.name, "connected and authenticated");
                    LinkState::Polling(stream)
                }
                LinkState::Polling(stream) => self.poll_once(stream).await,
                LinkState::Stopped => LinkState::Stopped,
            }
        };
        self.stats.set_phase(next.phase());
        next
    }

    async fn wait_reconnect(&self) -> LinkState {
        tokio::select! {
            _ = tokio::time::sleep(self.protocol.reconnect_delay()) => {
                LinkStats::bump(&self.stats.reconnects);
                LinkState::Connecting
            }
            _ = self.token.cancelled() => LinkState::Stopped,
        }
    }

    async fn connect(&self) -> LinkState {
        let addr = (self.endpoint.address.as_str(), self.endpoint.port);
        let attempt = tokio::time::timeout(self.protocol.connect_timeout(), TcpStream::connect(addr));

        let connected = tokio::select! {
            res = attempt => res,
            _ = self.token.cancelled() => return LinkState::Stopped,
        };
        let mut stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.report(LinkError::Connect { link: self.endpoint.name.clone(), source });
                return LinkState::Disconnected;
            }
            Err(_) => {
                let source = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {}:{} timed out", self.endpoint.address, self.endpoint.port),
                );
                self.report(LinkError::Connect { link: self.endpoint.name.clone(), source });
                return LinkState::Disconnected;
            }
        };
        // Запрос-ответ из мелких пакетов: без Nagle.
        let _ = stream.set_nodelay(true);

        let sent = tokio::select! {
            res = stream.write_all(self.protocol.secret.as_bytes()) => res,
            _ = self.token.cancelled() => return LinkState::Stopped,
        };
        if let Err(source) = sent {
            self.report(LinkError::Auth { link: self.endpoint.name.clone(), source });
            return LinkState::Disconnected;
        }

        LinkState::Authenticated(stream)
    }

    /// command → read (с дедлайном) → decode → enqueue.
    async fn poll_once(&mut self, mut stream: TcpStream) -> LinkState {
        let size = self.endpoint.kind.record_size();

        let sent = tokio::select! {
            res = stream.write_all(self.protocol.command.as_bytes()) => res,
            _ = self.token.cancelled() => return LinkState::Stopped,
        };
        if let Err(source) = sent {
            self.report(LinkError::Send { link: self.endpoint.name.clone(), source });
            return LinkState::Disconnected;
        }

        let mut filled = 0;
        let read = {
            let buf = &mut self.buf[..size];
            tokio::select! {
                res = tokio::time::timeout(self.protocol.read_timeout(), read_record(&mut stream, buf, &mut filled)) => res,
                _ = self.token.cancelled() => return LinkState::Stopped,
            }
        };

        let n = match read {
            // Сервер молчит — данных пока нет, повторить команду.
            Err(_elapsed) if filled == 0 => {
                tracing::trace!(link = %self.endpoint.name, "read idle timeout");
                return LinkState::Polling(stream);
            }
            // Дедлайн посреди записи: граница записей потеряна, выровнять
            // поток можно только новым соединением.
            Err(_elapsed) => {
                let source = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read deadline after {filled} of {size} bytes"),
                );
                self.report(LinkError::Read { link: self.endpoint.name.clone(), source });
                return LinkState::Disconnected;
            }
            Ok(Ok(0)) => {
                self.report(LinkError::ConnectionClosed { link: self.endpoint.name.clone() });
                return LinkState::Disconnected;
            }
            Ok(Ok(n)) => n,
            Ok(Err(source)) => {
                self.report(LinkError::Read { link: self.endpoint.name.clone(), source });
                return LinkState::Disconnected;
            }
        };

        if n != size {
            self.report(LinkError::IncompleteRecord {
                link: self.endpoint.name.clone(),
                got: n,
                expected: size,
            });
            return LinkState::Polling(stream);
        }
        LinkStats::bump(&self.stats.received);

        match decode(self.endpoint.kind, &self.buf[..size]) {
            Ok(record) => {
                if !self.enqueue(record) {
                    return LinkState::Stopped;
                }
            }
            Err(source) => {
                LinkStats::bump(&self.stats.decode_errors);
                self.report(LinkError::Decode { link: self.endpoint.name.clone(), source });
            }
        }

        LinkState::Polling(stream)
    }

    /// `false` — потребитель закрыл очередь, продолжать незачем.
    fn enqueue(&self, record: DataRecord) -> bool {
        match try_enqueue(&self.records, record) {
            Enqueue::Sent => {
                LinkStats::bump(&self.stats.delivered);
                true
            }
            Enqueue::Dropped => {
                LinkStats::bump(&self.stats.dropped);
                tracing::warn!(link = %self.endpoint.name, "data channel full, dropping record");
                self.report(LinkError::RecordDropped { link: self.endpoint.name.clone() });
                true
            }
            Enqueue::Closed => {
                tracing::info!(link = %self.endpoint.name, "record queue closed");
                false
            }
        }
    }

    fn report(&self, err: LinkError) {
        tracing::debug!(link = %self.endpoint.name, error = %err, "link diagnostic");
        if try_enqueue(&self.errors, err) == Enqueue::Dropped {
            tracing::warn!(link = %self.endpoint.name, "error channel full, dropping diagnostic");
        }
    }
}

/// Прочитать ровно `buf.len()` байт.
///
/// `Ok(0)` — поток закрыт на границе записи. Закрытие посреди записи —
/// `UnexpectedEof`. `filled` виден вызывающему и после отмены future
/// (например, по дедлайну).
async fn read_record<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8], filled: &mut usize) -> io::Result<usize> {
    while *filled < buf.len() {
        match reader.read(&mut buf[*filled..]).await? {
            0 if *filled == 0 => return Ok(0),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream closed after {} of {} bytes", *filled, buf.len()),
                ));
            }
            n => *filled += n,
        }
    }
    Ok(*filled)
}

// ═══════════════════════════════════════════════════════════════
//  LinkHandle
// ═══════════════════════════════════════════════════════════════

/// Handle запущенного link'а.
pub struct LinkHandle {
    name: String,
    token: CancellationToken,
    stats: Arc<LinkStats>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.stats
    }

    pub fn phase(&self) -> LinkPhase {
        self.stats.phase()
    }

    /// Остановить link. Активное соединение закрывается, ожидающие
    /// connect/read/delay прерываются.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(link = %self.name, error = %e, "link task failed");
        }
    }
}
