// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Workflow controller error types.

use std::fmt;

use crate::wire::{ErrCode, ErrorBody, Xid};

/// Error surfaced by a remote component through its client trait: the wire
/// code plus the human-readable message the component sent.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub code: ErrCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// What went wrong in a workflow operation.
#[derive(Debug, thiserror::Error)]
pub enum WcErrorKind {
    #[error("{resource} not found: {key}")]
    ResourceNotFound { resource: &'static str, key: String },

    #[error(
        "{resource} {key}: insufficient availability (requested {requested}, available {available})"
    )]
    InsufficientAvailability {
        resource: &'static str,
        key: String,
        requested: i64,
        available: i64,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("workflow controller is unavailable")]
    Unavailable,
}

impl WcErrorKind {
    fn code(&self) -> ErrCode {
        match self {
            Self::ResourceNotFound { .. } => ErrCode::KeyNotFound,
            Self::InsufficientAvailability { .. } => ErrCode::InsufficientAvailability,
            Self::Remote(remote) => remote.code,
            Self::Validation(_) => ErrCode::InternalInvariant,
            Self::Unavailable => ErrCode::Unavailable,
        }
    }
}

/// A workflow failure, annotated with the transaction it happened under
/// and whether the controller auto-aborted that transaction before
/// surfacing the error.
#[derive(Debug)]
pub struct WcError {
    pub kind: WcErrorKind,
    pub xid: Option<Xid>,
    pub transaction_aborted: bool,
}

impl WcError {
    pub fn new(kind: WcErrorKind) -> Self {
        Self {
            kind,
            xid: None,
            transaction_aborted: false,
        }
    }

    pub fn with_xid(mut self, xid: &Xid) -> Self {
        self.xid = Some(xid.clone());
        self
    }

    /// Marks that the enclosing transaction was aborted on the caller's
    /// behalf.
    pub fn aborted(mut self) -> Self {
        self.transaction_aborted = true;
        self
    }

    /// The wire code this failure travels as.
    pub fn code(&self) -> ErrCode {
        self.kind.code()
    }

    /// The HTTP status of [`code`](Self::code).
    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    /// The JSON error body a binding layer would serialize.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind.to_string(),
            code: self.code(),
            xid: self.xid.clone(),
            transaction_aborted: self.transaction_aborted,
        }
    }
}

impl fmt::Display for WcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for WcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<WcErrorKind> for WcError {
    fn from(kind: WcErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<RemoteError> for WcError {
    fn from(remote: RemoteError) -> Self {
        Self::new(WcErrorKind::Remote(remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_carries_abort_flag() {
        let err = WcError::new(WcErrorKind::ResourceNotFound {
            resource: "customer",
            key: "ghost".to_string(),
        })
        .with_xid(&Xid::from("tx-1"))
        .aborted();

        let body = err.body();
        assert_eq!(body.code, ErrCode::KeyNotFound);
        assert!(body.transaction_aborted);
        assert_eq!(body.xid, Some(Xid::from("tx-1")));
        assert!(body.error.contains("ghost"));
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_remote_error_code_passthrough() {
        let err = WcError::from(RemoteError::new(ErrCode::VersionConflict, "stale"));
        assert_eq!(err.code(), ErrCode::VersionConflict);
        assert_eq!(err.http_status(), 409);
        assert!(!err.transaction_aborted);
    }

    #[test]
    fn test_insufficient_availability_status() {
        let err = WcError::new(WcErrorKind::InsufficientAvailability {
            resource: "flight",
            key: "0002".to_string(),
            requested: 2,
            available: 1,
        });
        assert_eq!(err.code(), ErrCode::InsufficientAvailability);
        assert_eq!(err.http_status(), 409);
    }
}
