//! Synchronous failures raised at the call site.
//!
//! Protocol and connection failures never show up here; they arrive as
//! event capsules.

use assetlink_core::wire::{FileType, WireError};

use crate::table::MAX_OPERATIONS;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection is not active")]
    NotActive,

    #[error("a connection is already active")]
    AlreadyConnected,

    #[error("no user id assigned yet")]
    MissingUserId,

    #[error("file type {0:?} cannot be requested")]
    InvalidFileType(FileType),

    #[error("file of {0} bytes exceeds the transfer size limit")]
    FileTooLarge(usize),

    #[error("invalid file name: {0}")]
    InvalidFileName(#[from] WireError),

    #[error("all {} operation ids are in use", MAX_OPERATIONS)]
    IdsExhausted,

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Misuse by the caller, as opposed to exhaustion or I/O.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            ClientError::NotActive
                | ClientError::AlreadyConnected
                | ClientError::MissingUserId
                | ClientError::InvalidFileType(_)
                | ClientError::FileTooLarge(_)
                | ClientError::InvalidFileName(_)
        )
    }
}
