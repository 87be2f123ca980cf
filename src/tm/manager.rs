// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The two-phase-commit driver.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::wire::{TxnStatus, Xid};

use super::config::TmConfig;
use super::error::TmError;
use super::participant::ParticipantClient;

/// Per-transaction coordinator state.
struct TxnRecord {
    state: TxnStatus,
    /// Enlisted participant endpoints, in stable enlist order, deduplicated.
    participants: Vec<String>,
}

/// The global transaction coordinator.
///
/// Cheap to clone and share: all state lives behind one `Arc`. The mutex
/// over the transaction table is held only for state transitions; every
/// outbound call happens against a snapshot of the participant set taken
/// before the lock is released.
pub struct TransactionManager<C: ParticipantClient + 'static> {
    inner: Arc<TmInner<C>>,
}

impl<C: ParticipantClient + 'static> Clone for TransactionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct TmInner<C> {
    client: C,
    config: TmConfig,
    txns: Mutex<HashMap<Xid, TxnRecord>>,
}

#[derive(Clone, Copy)]
enum Decision {
    Commit,
    Abort,
}

impl Decision {
    fn name(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Abort => "abort",
        }
    }
}

impl<C: ParticipantClient + 'static> TransactionManager<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, TmConfig::default())
    }

    pub fn with_config(client: C, config: TmConfig) -> Self {
        Self {
            inner: Arc::new(TmInner {
                client,
                config,
                txns: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Allocates a globally unique transaction id.
    pub fn start(&self) -> Xid {
        let xid = Xid::generate();
        self.inner.txns.lock().insert(
            xid.clone(),
            TxnRecord {
                state: TxnStatus::Active,
                participants: Vec::new(),
            },
        );
        debug!(%xid, "transaction started");
        xid
    }

    /// Registers a participant endpoint for the transaction. Set
    /// semantics: enlisting the same endpoint twice is a no-op.
    pub fn enlist(&self, xid: &Xid, endpoint: &str) -> Result<(), TmError> {
        let mut txns = self.inner.txns.lock();
        let record = txns
            .get_mut(xid)
            .ok_or_else(|| TmError::NotFound { xid: xid.clone() })?;
        if record.state != TxnStatus::Active {
            return Err(TmError::InvalidState {
                xid: xid.clone(),
                status: record.state,
            });
        }
        if !record.participants.iter().any(|p| p == endpoint) {
            record.participants.push(endpoint.to_string());
            debug!(%xid, endpoint, "participant enlisted");
        }
        Ok(())
    }

    /// Current state of a transaction, if the coordinator knows it.
    pub fn status(&self, xid: &Xid) -> Option<TxnStatus> {
        self.inner.txns.lock().get(xid).map(|r| r.state)
    }

    /// Drives two-phase commit to a decision.
    ///
    /// Returns the terminal status, idempotently repeating it for a
    /// finished transaction. If the driver outlives the caller-facing
    /// `commit_timeout`, `IN_DOUBT` is returned while the driver keeps
    /// running; the eventual outcome is observable via
    /// [`status`](Self::status).
    pub async fn commit(&self, xid: &Xid) -> Result<TxnStatus, TmError> {
        let participants = {
            let mut txns = self.inner.txns.lock();
            let record = txns
                .get_mut(xid)
                .ok_or_else(|| TmError::NotFound { xid: xid.clone() })?;
            match record.state {
                TxnStatus::Committed | TxnStatus::Aborted => return Ok(record.state),
                TxnStatus::Preparing | TxnStatus::InDoubt => {
                    // Another caller's driver is already running.
                    return Ok(TxnStatus::InDoubt);
                }
                TxnStatus::Active => {
                    record.state = TxnStatus::Preparing;
                    record.participants.clone()
                }
            }
        };

        let inner = self.inner.clone();
        let driver_xid = xid.clone();
        let driver =
            tokio::spawn(async move { inner.drive_commit(&driver_xid, &participants).await });

        match tokio::time::timeout(self.inner.config.commit_timeout, driver).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(join_err)) => Err(TmError::Internal(format!(
                "commit driver failed: {join_err}"
            ))),
            Err(_) => {
                warn!(%xid, "commit driver exceeded caller deadline; reporting IN_DOUBT");
                Ok(TxnStatus::InDoubt)
            }
        }
    }

    /// Aborts the transaction and broadcasts the decision. Idempotent; the
    /// terminal state wins, so aborting a committed transaction reports
    /// `COMMITTED` and does nothing.
    pub async fn abort(&self, xid: &Xid) -> Result<TxnStatus, TmError> {
        let participants = {
            let mut txns = self.inner.txns.lock();
            let record = txns
                .get_mut(xid)
                .ok_or_else(|| TmError::NotFound { xid: xid.clone() })?;
            match record.state {
                TxnStatus::Committed | TxnStatus::Aborted => return Ok(record.state),
                _ => {
                    record.state = TxnStatus::Aborted;
                    record.participants.clone()
                }
            }
        };

        info!(%xid, "transaction aborted by request");
        self.inner.broadcast(Decision::Abort, xid, &participants).await;
        Ok(TxnStatus::Aborted)
    }
}

impl<C: ParticipantClient + 'static> TmInner<C> {
    /// Runs both phases of the protocol. Always reaches a terminal state.
    #[instrument(skip_all, fields(xid = %xid, participants = participants.len()))]
    async fn drive_commit(&self, xid: &Xid, participants: &[String]) -> TxnStatus {
        // Phase 1: collect votes in stable order, one hop at a time.
        for endpoint in participants {
            let vote = tokio::time::timeout(
                self.config.prepare_timeout,
                self.client.prepare(endpoint, xid),
            )
            .await;

            let prepared = match vote {
                Ok(Ok(ack)) if ack.ok => true,
                Ok(Ok(ack)) => {
                    warn!(endpoint, code = ?ack.err, "participant voted no");
                    false
                }
                Ok(Err(err)) => {
                    warn!(endpoint, %err, "prepare failed");
                    false
                }
                Err(_) => {
                    warn!(endpoint, "prepare timed out");
                    false
                }
            };

            if !prepared {
                self.broadcast(Decision::Abort, xid, participants).await;
                return self.finish(xid, TxnStatus::Aborted);
            }
        }

        // A concurrent abort between the phases wins; do not commit over it.
        let still_preparing = self
            .txns
            .lock()
            .get(xid)
            .map(|r| r.state == TxnStatus::Preparing)
            .unwrap_or(false);
        if !still_preparing {
            self.broadcast(Decision::Abort, xid, participants).await;
            return self.finish(xid, TxnStatus::Aborted);
        }

        // Phase 2: every participant acknowledged prepare, so the decision
        // is commit; prepared state is durable at each participant.
        self.broadcast(Decision::Commit, xid, participants).await;
        info!(%xid, "transaction committed");
        self.finish(xid, TxnStatus::Committed)
    }

    /// Broadcasts a decision, retrying each participant with exponential
    /// backoff until it acknowledges or attempts run out.
    async fn broadcast(&self, decision: Decision, xid: &Xid, participants: &[String]) {
        for endpoint in participants {
            self.deliver(decision, xid, endpoint).await;
        }
    }

    async fn deliver(&self, decision: Decision, xid: &Xid, endpoint: &str) {
        for attempt in 0..self.config.retry.max_attempts {
            let call = async {
                match decision {
                    Decision::Commit => self.client.commit(endpoint, xid).await,
                    Decision::Abort => self.client.abort(endpoint, xid).await,
                }
            };

            match tokio::time::timeout(self.config.prepare_timeout, call).await {
                Ok(Ok(ack)) if ack.ok => return,
                Ok(Ok(ack)) => {
                    warn!(endpoint, op = decision.name(), code = ?ack.err, "participant refused decision")
                }
                Ok(Err(err)) => {
                    warn!(endpoint, op = decision.name(), %err, attempt, "decision delivery failed")
                }
                Err(_) => warn!(endpoint, op = decision.name(), attempt, "decision delivery timed out"),
            }

            tokio::time::sleep(self.config.retry.delay(attempt)).await;
        }
        // The decision itself is safe (prepared participants hold durable
        // state) but this endpoint needs operator attention.
        error!(
            endpoint,
            %xid,
            op = decision.name(),
            "participant never acknowledged decision"
        );
    }

    fn finish(&self, xid: &Xid, status: TxnStatus) -> TxnStatus {
        let mut txns = self.txns.lock();
        if let Some(record) = txns.get_mut(xid) {
            if !record.state.is_terminal() {
                record.state = status;
            }
            record.state
        } else {
            status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ErrCode;
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::super::participant::ParticipantAck;
    use async_trait::async_trait;

    #[derive(Clone)]
    enum Behavior {
        Ok,
        RejectPrepare(ErrCode),
        UnreachablePrepare,
        SlowPrepare(Duration),
        /// First N commit deliveries fail with a transport error.
        FlakyCommit(u32),
    }

    struct MockParticipant {
        behaviors: Mutex<HashMap<String, Behavior>>,
        calls: Mutex<VecDeque<(String, String)>>,
    }

    impl MockParticipant {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                behaviors: Mutex::new(HashMap::new()),
                calls: Mutex::new(VecDeque::new()),
            })
        }

        fn behave(&self, endpoint: &str, behavior: Behavior) {
            self.behaviors
                .lock()
                .insert(endpoint.to_string(), behavior);
        }

        fn record(&self, op: &str, endpoint: &str) {
            self.calls
                .lock()
                .push_back((op.to_string(), endpoint.to_string()));
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().iter().cloned().collect()
        }

        fn count(&self, op: &str, endpoint: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|(o, e)| o == op && e == endpoint)
                .count()
        }
    }

    #[async_trait]
    impl ParticipantClient for Arc<MockParticipant> {
        async fn prepare(&self, endpoint: &str, _xid: &Xid) -> Result<ParticipantAck, TmError> {
            self.record("prepare", endpoint);
            let behavior = self
                .behaviors
                .lock()
                .get(endpoint)
                .cloned()
                .unwrap_or(Behavior::Ok);
            match behavior {
                Behavior::RejectPrepare(code) => Ok(ParticipantAck::err(code)),
                Behavior::UnreachablePrepare => Err(TmError::Transport {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".to_string(),
                }),
                Behavior::SlowPrepare(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(ParticipantAck::ok())
                }
                _ => Ok(ParticipantAck::ok()),
            }
        }

        async fn commit(&self, endpoint: &str, _xid: &Xid) -> Result<ParticipantAck, TmError> {
            self.record("commit", endpoint);
            let mut behaviors = self.behaviors.lock();
            if let Some(Behavior::FlakyCommit(left)) = behaviors.get(endpoint).cloned() {
                if left > 0 {
                    behaviors.insert(endpoint.to_string(), Behavior::FlakyCommit(left - 1));
                    return Err(TmError::Transport {
                        endpoint: endpoint.to_string(),
                        reason: "connection reset".to_string(),
                    });
                }
            }
            Ok(ParticipantAck::ok())
        }

        async fn abort(&self, endpoint: &str, _xid: &Xid) -> Result<ParticipantAck, TmError> {
            self.record("abort", endpoint);
            Ok(ParticipantAck::ok())
        }
    }

    fn tm(mock: &Arc<MockParticipant>) -> TransactionManager<Arc<MockParticipant>> {
        TransactionManager::with_config(
            mock.clone(),
            TmConfig::default()
                .with_prepare_timeout(Duration::from_secs(1))
                .with_commit_timeout(Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn test_commit_success_runs_both_phases_in_order() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();
        tm.enlist(&xid, "http://customers").unwrap();

        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Committed);
        assert_eq!(tm.status(&xid), Some(TxnStatus::Committed));

        let calls = mock.calls();
        assert_eq!(
            calls,
            vec![
                ("prepare".to_string(), "http://flights".to_string()),
                ("prepare".to_string(), "http://customers".to_string()),
                ("commit".to_string(), "http://flights".to_string()),
                ("commit".to_string(), "http://customers".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_commit_idempotent_after_terminal() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();
        tm.commit(&xid).await.unwrap();
        let before = mock.calls().len();

        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Committed);
        assert_eq!(mock.calls().len(), before, "no extra participant calls");
    }

    #[tokio::test]
    async fn test_prepare_rejection_aborts_all() {
        let mock = MockParticipant::new();
        mock.behave("http://customers", Behavior::RejectPrepare(ErrCode::VersionConflict));
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();
        tm.enlist(&xid, "http://customers").unwrap();

        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Aborted);
        assert_eq!(tm.status(&xid), Some(TxnStatus::Aborted));

        assert_eq!(mock.count("commit", "http://flights"), 0);
        assert_eq!(mock.count("abort", "http://flights"), 1);
        assert_eq!(mock.count("abort", "http://customers"), 1);
    }

    #[tokio::test]
    async fn test_prepare_transport_error_aborts() {
        let mock = MockParticipant::new();
        mock.behave("http://flights", Behavior::UnreachablePrepare);
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();

        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_timeout_aborts() {
        let mock = MockParticipant::new();
        mock.behave("http://flights", Behavior::SlowPrepare(Duration::from_secs(30)));
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();

        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_deadline_reports_in_doubt_then_resolves() {
        let mock = MockParticipant::new();
        mock.behave("http://flights", Behavior::SlowPrepare(Duration::from_millis(500)));
        let tm = TransactionManager::with_config(
            mock.clone(),
            TmConfig::default()
                .with_prepare_timeout(Duration::from_secs(1))
                .with_commit_timeout(Duration::from_millis(100)),
        );

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();

        // The caller deadline fires before the slow prepare finishes.
        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::InDoubt);

        // The driver keeps running and reaches a terminal state.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tm.status(&xid), Some(TxnStatus::Committed));
        assert_eq!(mock.count("commit", "http://flights"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_broadcast_retries_until_ack() {
        let mock = MockParticipant::new();
        mock.behave("http://flights", Behavior::FlakyCommit(2));
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();

        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Committed);
        assert_eq!(mock.count("commit", "http://flights"), 3);
    }

    #[tokio::test]
    async fn test_enlist_is_set_semantics() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();
        tm.enlist(&xid, "http://flights").unwrap();

        tm.commit(&xid).await.unwrap();
        assert_eq!(mock.count("prepare", "http://flights"), 1);
    }

    #[tokio::test]
    async fn test_enlist_requires_active_transaction() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);

        let err = tm.enlist(&Xid::from("tx-nobody"), "http://flights").unwrap_err();
        assert!(matches!(err, TmError::NotFound { .. }));

        let xid = tm.start();
        tm.commit(&xid).await.unwrap();
        let err = tm.enlist(&xid, "http://flights").unwrap_err();
        assert!(matches!(err, TmError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_abort_broadcasts_and_is_idempotent() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);

        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();

        assert_eq!(tm.abort(&xid).await.unwrap(), TxnStatus::Aborted);
        assert_eq!(tm.abort(&xid).await.unwrap(), TxnStatus::Aborted);
        assert_eq!(mock.count("abort", "http://flights"), 1);
    }

    #[tokio::test]
    async fn test_terminal_state_wins_across_verbs() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);

        // commit after abort reports the abort.
        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();
        tm.abort(&xid).await.unwrap();
        assert_eq!(tm.commit(&xid).await.unwrap(), TxnStatus::Aborted);

        // abort after commit reports the commit.
        let xid = tm.start();
        tm.enlist(&xid, "http://flights").unwrap();
        tm.commit(&xid).await.unwrap();
        assert_eq!(tm.abort(&xid).await.unwrap(), TxnStatus::Committed);
    }

    #[tokio::test]
    async fn test_status_of_unknown_xid() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);
        assert_eq!(tm.status(&Xid::from("tx-nobody")), None);

        let err = tm.commit(&Xid::from("tx-nobody")).await.unwrap_err();
        assert!(matches!(err, TmError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_participant_set_commits() {
        let mock = MockParticipant::new();
        let tm = tm(&mock);

        let xid = tm.start();
        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Committed);
        assert!(mock.calls().is_empty());
    }
}
