// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! VoyageDB: the transactional core of a small distributed travel-booking
//! database.
//!
//! This crate provides the three layers of the system:
//!
//! - **Resource manager** ([`rm`]): a per-table storage engine offering CRUD
//!   under snapshot-like isolation, built from a paged key-to-record store,
//!   a row lock manager, per-transaction shadow records, and hybrid
//!   pessimistic-locking + optimistic validation. Prepared state is made
//!   durable so the manager survives a crash between prepare and the
//!   coordinator's decision.
//! - **Transaction manager** ([`tm`]): the global coordinator. Assigns
//!   transaction ids, tracks enlisted participants, and drives two-phase
//!   commit with idempotent outcomes.
//! - **Workflow controller** ([`wc`]): the orchestrator of multi-participant
//!   business operations (reservations), responsible for context
//!   propagation, auto-abort on failure, and `IN_DOUBT` handling on commit
//!   timeout.
//!
//! Storage primitives live in [`storage`]; the HTTP-facing schemas and the
//! error taxonomy live in [`wire`]. The HTTP binding itself is out of scope:
//! remote calls go through the client traits ([`tm::ParticipantClient`],
//! [`wc::TmApi`], [`wc::RmApi`]) so a binding layer can be bolted on without
//! touching the core.

pub mod rm;
pub mod storage;
pub mod tm;
pub mod wc;
pub mod wire;

pub use rm::{PrepareJournal, ResourceManager, RmError, RowLockManager, TxnPhase};
pub use storage::{
    fields, CompositeFixedWidthIndex, FieldValue, Key, LinearBucketIndex, MemPageIo, Page, PageId,
    PageIndex, PageIo, PrefixOrderedIndex, Record, RocksPageIo, StorageError,
};
pub use tm::{
    ParticipantAck, ParticipantClient, RetryPolicy, TmConfig, TmError, TransactionManager,
    TxnStatus, Xid,
};
pub use wc::{
    LocalParticipants, LocalRm, LocalTm, RemoteError, ReservationOutcome, ReservationType,
    RmApi, RmHandles, TmApi, WcConfig, WcError, WorkflowController,
};
pub use wire::ErrCode;
