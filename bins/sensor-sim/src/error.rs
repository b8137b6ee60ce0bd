#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("accept: {0}")]
    Accept(#[from] std::io::Error),

    #[error("invalid option: {0}")]
    Option(String),
}
