// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy and its HTTP status mapping.

use serde::{Deserialize, Serialize};

/// Stable error codes carried on the wire.
///
/// Three families: semantic errors the client caused (usually not
/// retryable), concurrency conflicts (retryable by re-running the whole
/// transaction), and system errors. Every code maps to one HTTP status so
/// clients can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrCode {
    /// Insert of a key that already exists.
    KeyExists,
    /// Read/update/delete of a key that does not exist.
    KeyNotFound,
    /// Not enough inventory to satisfy a reservation.
    InsufficientAvailability,
    /// The transaction id is unknown.
    TxnNotFound,
    /// Operation illegal in the transaction's current phase.
    TxnStateError,
    /// Non-blocking lock acquisition failed during prepare.
    LockConflict,
    /// Optimistic validation failed during prepare.
    VersionConflict,
    /// Backend or journal I/O failed.
    Io,
    /// A call exceeded its deadline.
    Timeout,
    /// The service refuses traffic (drained or dying).
    Unavailable,
    /// An implementation contract was breached; never retried.
    InternalInvariant,
}

impl ErrCode {
    /// The HTTP status this code travels with.
    pub fn http_status(self) -> u16 {
        match self {
            Self::KeyExists
            | Self::TxnStateError
            | Self::LockConflict
            | Self::VersionConflict
            | Self::InsufficientAvailability => 409,
            Self::KeyNotFound | Self::TxnNotFound => 404,
            Self::Unavailable => 503,
            Self::Timeout => 504,
            Self::Io | Self::InternalInvariant => 500,
        }
    }

    /// True for conflicts the client may resolve by retrying the whole
    /// transaction.
    pub fn is_retryable_conflict(self) -> bool {
        matches!(self, Self::LockConflict | Self::VersionConflict)
    }
}
