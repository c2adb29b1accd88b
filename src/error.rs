use std::{io, path::PathBuf};

use thiserror::Error;

use crate::protocol::Status;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    #[error("peer disconnected after {received} of {expected} bytes")]
    Disconnected { expected: u64, received: u64 },
    #[error("expected '{expected}' but received '{received}'")]
    ProtocolViolation { expected: Status, received: String },
    #[error("invalid length header {0}")]
    InvalidLength(i64),
    #[error("{}: {source}", .path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("local file I/O failed during transfer: {0}")]
    LocalIo(#[source] io::Error),
}

impl Error {
    /// Fatal errors leave the connection unusable; everything else keeps the
    /// command/reply exchange aligned and the session may continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Disconnected { .. })
    }

    pub fn resource(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Resource {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
