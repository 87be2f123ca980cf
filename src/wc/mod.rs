// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The workflow controller: cross-participant business orchestration.
//!
//! The controller is stateless. It holds client handles to the transaction
//! manager ([`TmApi`]) and to each resource manager ([`RmApi`]) and mirrors
//! the business verbs of the booking system: add/query/delete for
//! flights, hotels, cars, and customers, plus the composite `reserve`
//! operations. Every call propagates the transaction id to every
//! downstream call it makes.
//!
//! # Key Concepts
//!
//! ## Reserve
//!
//! A reservation is two writes under one transaction: decrement the
//! inventory's `numAvail` on the resource's manager, then insert a
//! reservation record on the customer manager, keyed by the fixed-width
//! `(custName, resvType, resvKey)` encoding. Both commit or neither does;
//! the coordinator's two-phase commit spans the participants.
//!
//! ## Auto-abort
//!
//! Failure handling is a single cross-cutting policy, not per-route logic:
//! when a downstream call under an active transaction fails and auto-abort
//! is enabled (the default), the controller best-effort aborts the
//! transaction at the coordinator and surfaces the original error marked
//! `transaction_aborted`.
//!
//! ## IN_DOUBT
//!
//! When commit exceeds the controller's client-facing deadline, the client
//! receives `IN_DOUBT` with guidance to poll the transaction status until
//! a terminal state appears; the coordinator still drives the decision.
//!
//! In-process adapters ([`LocalTm`], [`LocalRm`], [`LocalParticipants`])
//! bind the client traits straight to [`TransactionManager`] and
//! [`ResourceManager`] instances for tests and embedded deployments; an
//! HTTP binding implements the same traits against the wire contracts.
//!
//! [`TransactionManager`]: crate::tm::TransactionManager
//! [`ResourceManager`]: crate::rm::ResourceManager

mod api;
mod config;
mod controller;
mod error;
mod local;

pub use api::{RmApi, TmApi};
pub use config::WcConfig;
pub use controller::{ReservationOutcome, ReservationType, RmHandles, WorkflowController};
pub use error::{RemoteError, WcError, WcErrorKind};
pub use local::{LocalParticipants, LocalRm, LocalTm, RmTxnOps};
