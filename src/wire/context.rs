// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction ids and context propagation.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the transaction id on every transactional request.
pub const TRANSACTION_HEADER: &str = "X-Transaction-Id";

/// Legacy query parameter accepted by the TM endpoints.
pub const XID_QUERY_PARAM: &str = "xid";

/// Opaque identifier of a global transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Xid(String);

impl Xid {
    /// Allocates a fresh, globally unique id.
    pub fn generate() -> Self {
        Self(format!("tx-{}", Uuid::new_v4().simple()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Xid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Xid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the transaction context of an inbound request.
///
/// Accepts both the `X-Transaction-Id` header and the legacy `xid` query
/// parameter; the header wins when both are present. Empty values count as
/// absent.
pub fn txn_context(header: Option<&str>, query: Option<&str>) -> Option<Xid> {
    header
        .filter(|v| !v.is_empty())
        .or(query.filter(|v| !v.is_empty()))
        .map(Xid::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_xids_are_unique() {
        let a = Xid::generate();
        let b = Xid::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("tx-"));
    }

    #[test]
    fn test_context_header_wins() {
        let ctx = txn_context(Some("tx-header"), Some("tx-query"));
        assert_eq!(ctx, Some(Xid::from("tx-header")));
    }

    #[test]
    fn test_context_falls_back_to_query() {
        let ctx = txn_context(None, Some("tx-query"));
        assert_eq!(ctx, Some(Xid::from("tx-query")));

        let ctx = txn_context(Some(""), Some("tx-query"));
        assert_eq!(ctx, Some(Xid::from("tx-query")));
    }

    #[test]
    fn test_context_absent() {
        assert_eq!(txn_context(None, None), None);
        assert_eq!(txn_context(Some(""), None), None);
    }

    #[test]
    fn test_xid_serializes_as_plain_string() {
        let xid = Xid::from("tx-1");
        assert_eq!(serde_json::to_string(&xid).unwrap(), "\"tx-1\"");
    }
}
