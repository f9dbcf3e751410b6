use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("failed to create mailbox dir {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to remove {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("failed to encode status record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("input writes are disabled")]
    Rejected,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("context must not be empty")]
    EmptyContext,

    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}
