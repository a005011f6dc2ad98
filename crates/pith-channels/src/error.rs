use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{channel}: connect failed: {source}")]
    Connect { channel: String, source: anyhow::Error },
    #[error("{channel}: receive failed: {source}")]
    Recv { channel: String, source: anyhow::Error },
    #[error("{channel}: send failed: {source}")]
    Send { channel: String, source: anyhow::Error },
    #[error("store error: {0}")]
    Store(#[from] pith_store::StoreError),
}
