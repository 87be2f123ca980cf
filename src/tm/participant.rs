// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The outbound participant contract.

use async_trait::async_trait;

use crate::wire::{OpOutcome, Xid};

use super::error::TmError;

/// Acknowledgement from a participant's transaction endpoint: the same
/// `{ok, err}` shape the resource managers put on the wire.
pub type ParticipantAck = OpOutcome;

/// Transport to the resource managers' `prepare`/`commit`/`abort`
/// endpoints.
///
/// The coordinator is transport-agnostic: an HTTP binding implements this
/// trait against `POST {endpoint}/txn/{op}?xid={xid}`, and tests implement
/// it in-process. A returned `Err` means the participant could not be
/// reached or answered garbage; a returned ack with `ok = false` is the
/// participant's own verdict.
#[async_trait]
pub trait ParticipantClient: Send + Sync {
    /// Asks a participant to prepare the transaction.
    async fn prepare(&self, endpoint: &str, xid: &Xid) -> Result<ParticipantAck, TmError>;

    /// Tells a participant to commit its prepared transaction.
    async fn commit(&self, endpoint: &str, xid: &Xid) -> Result<ParticipantAck, TmError>;

    /// Tells a participant to abort the transaction.
    async fn abort(&self, endpoint: &str, xid: &Xid) -> Result<ParticipantAck, TmError>;
}
