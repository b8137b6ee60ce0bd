#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Ingest(#[from] ingest::IngestError),

    #[error("sink: {0}")]
    Sink(#[from] ingest::SinkError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
