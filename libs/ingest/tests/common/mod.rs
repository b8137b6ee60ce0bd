//! Mock sensor server for link/pipeline tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ingest::config::{EndpointConfig, ProtocolConfig};
use sensor_api::{DataRecord, Reading, SourceKind, encode, timestamp_from_micros};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What the mock does after receiving one command.
pub enum Reply {
    Bytes(Vec<u8>),
    /// Write the first `at` bytes, pause, then write the rest.
    Stalled { bytes: Vec<u8>, at: usize, pause: Duration },
    /// Read the command, answer nothing.
    Silent,
    /// Close the connection (cleanly, after the command was consumed).
    Close,
}

pub struct MockServer {
    pub addr: SocketAddr,
    /// Commands received across all connections.
    pub commands: Arc<AtomicUsize>,
    /// Connections that passed the secret check.
    pub connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// `reply(connection_index, command_index_within_connection)`.
    pub async fn start<F>(reply: F) -> Self
    where
        F: Fn(usize, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let reply = Arc::new(reply);

        let task = {
            let commands = commands.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut conn, _)) = listener.accept().await else {
                        return;
                    };
                    let commands = commands.clone();
                    let connections = connections.clone();
                    let reply = reply.clone();
                    tokio::spawn(async move {
                        let mut secret = [0u8; 6];
                        if conn.read_exact(&mut secret).await.is_err() || &secret != b"isu_pt" {
                            return;
                        }
                        let conn_idx = connections.fetch_add(1, Ordering::SeqCst);

                        let mut cmd_idx = 0;
                        loop {
                            let mut cmd = [0u8; 3];
                            if conn.read_exact(&mut cmd).await.is_err() || &cmd != b"get" {
                                return;
                            }
                            commands.fetch_add(1, Ordering::SeqCst);
                            match reply(conn_idx, cmd_idx) {
                                Reply::Bytes(bytes) => {
                                    if conn.write_all(&bytes).await.is_err() {
                                        return;
                                    }
                                }
                                Reply::Stalled { bytes, at, pause } => {
                                    if conn.write_all(&bytes[..at]).await.is_err() {
                                        return;
                                    }
                                    tokio::time::sleep(pause).await;
                                    if conn.write_all(&bytes[at..]).await.is_err() {
                                        return;
                                    }
                                }
                                Reply::Silent => {}
                                Reply::Close => return,
                            }
                            cmd_idx += 1;
                        }
                    });
                }
            })
        };

        Self { addr, commands, connections, task }
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self, name: &str, kind: SourceKind) -> EndpointConfig {
        EndpointConfig::new(name, "127.0.0.1", self.addr.port(), kind)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn fast_protocol(read_timeout_ms: u64) -> ProtocolConfig {
    ProtocolConfig {
        connect_timeout_ms: 1_000,
        read_timeout_ms,
        reconnect_delay_ms: 50,
        ..Default::default()
    }
}

/// Valid wire record; `seq` goes into the variable fields.
pub fn record_bytes(kind: SourceKind, seq: usize) -> Vec<u8> {
    let reading = match kind {
        SourceKind::Server1 => Reading::Climate { temperature: 20.0 + seq as f32 * 0.5, pressure: seq as i16 },
        SourceKind::Server2 => Reading::Motion { x: seq as i32, y: -(seq as i32), z: 7 },
    };
    encode(&DataRecord {
        timestamp: timestamp_from_micros(1_700_000_000_000_000 + seq as i64).unwrap(),
        reading,
    })
}

pub fn corrupt(mut bytes: Vec<u8>) -> Vec<u8> {
    let last = bytes.len() - 1;
    bytes[last] = bytes[last].wrapping_add(1);
    bytes
}

/// Poll `cond` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
