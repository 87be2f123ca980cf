// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Resource manager error types.

use crate::storage::{Key, StorageError};
use crate::wire::{ErrCode, Xid};

/// Errors that can occur in resource manager operations.
#[derive(Debug, thiserror::Error)]
pub enum RmError {
    #[error("key already exists: {key}")]
    KeyExists { key: Key },

    #[error("key not found: {key}")]
    KeyNotFound { key: Key },

    #[error("lock conflict on key {key}")]
    LockConflict { key: Key },

    #[error("version conflict on key {key}: observed {observed}, committed {committed}")]
    VersionConflict {
        key: Key,
        observed: u64,
        committed: u64,
    },

    #[error("transaction {xid} is in the wrong phase: {detail}")]
    InvalidTxnState { xid: Xid, detail: &'static str },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RmError {
    /// The wire code this error travels as.
    pub fn code(&self) -> ErrCode {
        match self {
            Self::KeyExists { .. } => ErrCode::KeyExists,
            Self::KeyNotFound { .. } => ErrCode::KeyNotFound,
            Self::LockConflict { .. } => ErrCode::LockConflict,
            Self::VersionConflict { .. } => ErrCode::VersionConflict,
            Self::InvalidTxnState { .. } => ErrCode::TxnStateError,
            Self::Invariant(_) => ErrCode::InternalInvariant,
            Self::Storage(_) => ErrCode::Io,
        }
    }
}
