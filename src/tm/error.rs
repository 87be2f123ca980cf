// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Coordinator error types.

use crate::wire::{ErrCode, TxnStatus, Xid};

/// Errors that can occur in coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum TmError {
    #[error("transaction not found: {xid}")]
    NotFound { xid: Xid },

    #[error("transaction {xid} is {status}; operation requires an active transaction")]
    InvalidState { xid: Xid, status: TxnStatus },

    #[error("participant {endpoint} rejected {op}: {code:?}")]
    Rejected {
        endpoint: String,
        op: &'static str,
        code: Option<ErrCode>,
    },

    #[error("participant {endpoint} unreachable: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("call to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("coordinator internal error: {0}")]
    Internal(String),
}

impl TmError {
    /// The wire code this error travels as.
    pub fn code(&self) -> ErrCode {
        match self {
            Self::NotFound { .. } => ErrCode::TxnNotFound,
            Self::InvalidState { .. } => ErrCode::TxnStateError,
            Self::Rejected { code, .. } => code.unwrap_or(ErrCode::InternalInvariant),
            Self::Transport { .. } => ErrCode::Unavailable,
            Self::Timeout { .. } => ErrCode::Timeout,
            Self::Internal(_) => ErrCode::InternalInvariant,
        }
    }
}
