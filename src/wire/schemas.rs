// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Request and response schemas of the TM and RM endpoint contracts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::FieldValue;

use super::codes::ErrCode;
use super::context::Xid;

/// Observable state of a global transaction.
///
/// `InDoubt` is reported to clients when the commit decision is not yet
/// observable; it is never a stored state, and status queries keep
/// returning the coordinator's local record until a terminal state is
/// reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnStatus {
    Active,
    Preparing,
    Committed,
    Aborted,
    InDoubt,
}

impl TxnStatus {
    /// True once no further transition is possible.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Preparing => "PREPARING",
            Self::Committed => "COMMITTED",
            Self::Aborted => "ABORTED",
            Self::InDoubt => "IN_DOUBT",
        };
        f.write_str(s)
    }
}

/// Response of the TM's start/commit/abort/status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnStatusResponse {
    pub xid: Xid,
    pub status: TxnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TxnStatusResponse {
    pub fn new(xid: Xid, status: TxnStatus) -> Self {
        Self {
            xid,
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Body of `POST /txn/enlist`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnlistRequest {
    pub xid: Xid,
    pub endpoint: String,
}

/// Body of `POST /records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCreateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xid: Option<Xid>,
    pub key: String,
    pub value: BTreeMap<String, FieldValue>,
}

/// Body of `PATCH /records/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xid: Option<Xid>,
    pub updates: BTreeMap<String, FieldValue>,
}

/// Response of `GET /records/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub key: String,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Outcome of an RM-side `prepare`/`commit`/`abort` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<ErrCode>,
}

impl OpOutcome {
    pub fn ok() -> Self {
        Self { ok: true, err: None }
    }

    pub fn err(code: ErrCode) -> Self {
        Self {
            ok: false,
            err: Some(code),
        }
    }
}

/// Structured error surface of the workflow controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xid: Option<Xid>,
    #[serde(default)]
    pub transaction_aborted: bool,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
