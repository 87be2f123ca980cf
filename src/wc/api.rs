// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Client traits for the controller's downstream components.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::storage::{FieldValue, Record};
use crate::wire::{TxnStatusResponse, Xid};

use super::error::RemoteError;

/// Client to the transaction manager's endpoint contract.
///
/// An HTTP binding implements this against `POST /txn/start`,
/// `POST /txn/commit?xid=..`, `POST /txn/abort?xid=..`, and
/// `GET /txn/{xid}`; [`LocalTm`](super::LocalTm) binds it in-process.
#[async_trait]
pub trait TmApi: Send + Sync {
    /// Starts a transaction and returns its id.
    async fn start(&self) -> Result<Xid, RemoteError>;

    /// Drives two-phase commit; the response carries the resulting status.
    async fn commit(&self, xid: &Xid) -> Result<TxnStatusResponse, RemoteError>;

    /// Aborts the transaction (idempotent).
    async fn abort(&self, xid: &Xid) -> Result<TxnStatusResponse, RemoteError>;

    /// Queries the transaction's current status.
    async fn status(&self, xid: &Xid) -> Result<TxnStatusResponse, RemoteError>;

    /// Probes the component's health endpoint.
    async fn health(&self) -> Result<(), RemoteError>;
}

/// Client to one resource manager's record endpoint contract.
///
/// An HTTP binding implements this against `GET/POST/PATCH/DELETE
/// /records/..` with the transaction id in the `X-Transaction-Id` header;
/// [`LocalRm`](super::LocalRm) binds it in-process. The binding is also
/// responsible for enlisting the manager with the coordinator on the first
/// mutation under a transaction.
#[async_trait]
pub trait RmApi: Send + Sync {
    /// Reads a record: under a transaction when `xid` is given, committed
    /// state otherwise.
    async fn get(&self, xid: Option<&Xid>, key: &str) -> Result<Record, RemoteError>;

    /// Creates a record under the transaction.
    async fn create(
        &self,
        xid: &Xid,
        key: &str,
        value: BTreeMap<String, FieldValue>,
    ) -> Result<(), RemoteError>;

    /// Partially updates a record under the transaction.
    async fn patch(
        &self,
        xid: &Xid,
        key: &str,
        updates: BTreeMap<String, FieldValue>,
    ) -> Result<(), RemoteError>;

    /// Deletes a record under the transaction.
    async fn remove(&self, xid: &Xid, key: &str) -> Result<(), RemoteError>;

    /// Probes the component's health endpoint.
    async fn health(&self) -> Result<(), RemoteError>;

    /// The endpoint this client talks to, as enlisted with the
    /// coordinator.
    fn endpoint(&self) -> &str;
}
