// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-process bindings of the client traits.
//!
//! These adapters wire a [`WorkflowController`](super::WorkflowController)
//! and a [`TransactionManager`] directly to [`ResourceManager`] instances
//! in the same process: tests and embedded deployments get the full
//! transaction protocol without a network. They also carry the one
//! binding-layer duty the core leaves outside: enlisting a resource
//! manager with the coordinator on the first mutation under a transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::rm::{ResourceManager, RmError};
use crate::storage::{FieldValue, PageIndex, PageIo, Record};
use crate::tm::{ParticipantAck, ParticipantClient, TmError, TransactionManager};
use crate::wire::{TxnStatusResponse, Xid};

use super::api::{RmApi, TmApi};
use super::error::RemoteError;

/// Object-safe transaction-control surface of a resource manager, so
/// differently-typed managers can share one participant registry.
pub trait RmTxnOps: Send + Sync {
    fn prepare(&self, xid: &Xid) -> Result<(), RmError>;
    fn commit(&self, xid: &Xid) -> Result<(), RmError>;
    fn abort(&self, xid: &Xid) -> Result<(), RmError>;
}

impl<IO: PageIo, IX: PageIndex> RmTxnOps for ResourceManager<IO, IX> {
    fn prepare(&self, xid: &Xid) -> Result<(), RmError> {
        ResourceManager::prepare(self, xid)
    }

    fn commit(&self, xid: &Xid) -> Result<(), RmError> {
        ResourceManager::commit(self, xid)
    }

    fn abort(&self, xid: &Xid) -> Result<(), RmError> {
        ResourceManager::abort(self, xid)
    }
}

/// Routes the coordinator's participant calls to in-process resource
/// managers by endpoint name. Cheap to clone; registrations are shared.
#[derive(Clone, Default)]
pub struct LocalParticipants {
    routes: Arc<RwLock<HashMap<String, Arc<dyn RmTxnOps>>>>,
}

impl LocalParticipants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource manager under an endpoint name.
    pub fn register(&self, endpoint: impl Into<String>, rm: Arc<dyn RmTxnOps>) {
        self.routes.write().insert(endpoint.into(), rm);
    }

    fn route(&self, endpoint: &str) -> Result<Arc<dyn RmTxnOps>, TmError> {
        self.routes
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TmError::Transport {
                endpoint: endpoint.to_string(),
                reason: "no such participant registered".to_string(),
            })
    }
}

#[async_trait]
impl ParticipantClient for LocalParticipants {
    async fn prepare(&self, endpoint: &str, xid: &Xid) -> Result<ParticipantAck, TmError> {
        let rm = self.route(endpoint)?;
        // A validation or conflict failure is the participant's "no" vote,
        // not a transport error.
        Ok(match rm.prepare(xid) {
            Ok(()) => ParticipantAck::ok(),
            Err(err) => ParticipantAck::err(err.code()),
        })
    }

    async fn commit(&self, endpoint: &str, xid: &Xid) -> Result<ParticipantAck, TmError> {
        let rm = self.route(endpoint)?;
        Ok(match rm.commit(xid) {
            Ok(()) => ParticipantAck::ok(),
            Err(err) => ParticipantAck::err(err.code()),
        })
    }

    async fn abort(&self, endpoint: &str, xid: &Xid) -> Result<ParticipantAck, TmError> {
        let rm = self.route(endpoint)?;
        Ok(match rm.abort(xid) {
            Ok(()) => ParticipantAck::ok(),
            Err(err) => ParticipantAck::err(err.code()),
        })
    }
}

fn remote_from_tm(err: TmError) -> RemoteError {
    RemoteError::new(err.code(), err.to_string())
}

fn remote_from_rm(err: RmError) -> RemoteError {
    RemoteError::new(err.code(), err.to_string())
}

/// [`TmApi`] bound to an in-process coordinator.
pub struct LocalTm {
    tm: TransactionManager<LocalParticipants>,
}

impl LocalTm {
    pub fn new(tm: TransactionManager<LocalParticipants>) -> Arc<Self> {
        Arc::new(Self { tm })
    }
}

#[async_trait]
impl TmApi for LocalTm {
    async fn start(&self) -> Result<Xid, RemoteError> {
        Ok(self.tm.start())
    }

    async fn commit(&self, xid: &Xid) -> Result<TxnStatusResponse, RemoteError> {
        let status = self.tm.commit(xid).await.map_err(remote_from_tm)?;
        Ok(TxnStatusResponse::new(xid.clone(), status))
    }

    async fn abort(&self, xid: &Xid) -> Result<TxnStatusResponse, RemoteError> {
        let status = self.tm.abort(xid).await.map_err(remote_from_tm)?;
        Ok(TxnStatusResponse::new(xid.clone(), status))
    }

    async fn status(&self, xid: &Xid) -> Result<TxnStatusResponse, RemoteError> {
        match self.tm.status(xid) {
            Some(status) => Ok(TxnStatusResponse::new(xid.clone(), status)),
            None => Err(remote_from_tm(TmError::NotFound { xid: xid.clone() })),
        }
    }

    async fn health(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// [`RmApi`] bound to an in-process resource manager.
///
/// Mutations enlist the manager with the coordinator before touching the
/// shadow state, so the coordinator's participant set is complete by the
/// time commit is requested.
pub struct LocalRm<IO: PageIo, IX: PageIndex> {
    endpoint: String,
    rm: Arc<ResourceManager<IO, IX>>,
    tm: TransactionManager<LocalParticipants>,
}

impl<IO: PageIo + 'static, IX: PageIndex + 'static> LocalRm<IO, IX> {
    /// Binds a resource manager under an endpoint name and registers it
    /// with the participant registry.
    pub fn bind(
        endpoint: impl Into<String>,
        rm: Arc<ResourceManager<IO, IX>>,
        tm: TransactionManager<LocalParticipants>,
        participants: &LocalParticipants,
    ) -> Arc<Self> {
        let endpoint = endpoint.into();
        participants.register(endpoint.clone(), rm.clone());
        Arc::new(Self { endpoint, rm, tm })
    }

    fn enlist(&self, xid: &Xid) -> Result<(), RemoteError> {
        self.tm.enlist(xid, &self.endpoint).map_err(remote_from_tm)
    }
}

#[async_trait]
impl<IO: PageIo + 'static, IX: PageIndex + 'static> RmApi for LocalRm<IO, IX> {
    async fn get(&self, xid: Option<&Xid>, key: &str) -> Result<Record, RemoteError> {
        match xid {
            Some(xid) => self.rm.read(xid, key).map_err(remote_from_rm),
            None => self.rm.read_committed(key).map_err(remote_from_rm),
        }
    }

    async fn create(
        &self,
        xid: &Xid,
        key: &str,
        value: BTreeMap<String, FieldValue>,
    ) -> Result<(), RemoteError> {
        self.enlist(xid)?;
        self.rm.add(xid, key, value).map_err(remote_from_rm)
    }

    async fn patch(
        &self,
        xid: &Xid,
        key: &str,
        updates: BTreeMap<String, FieldValue>,
    ) -> Result<(), RemoteError> {
        self.enlist(xid)?;
        self.rm.update(xid, key, updates).map_err(remote_from_rm)
    }

    async fn remove(&self, xid: &Xid, key: &str) -> Result<(), RemoteError> {
        self.enlist(xid)?;
        self.rm.delete(xid, key).map_err(remote_from_rm)
    }

    async fn health(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{fields, MemPageIo, PrefixOrderedIndex};
    use crate::wire::TxnStatus;
    use tempfile::TempDir;

    fn open_rm(
        dir: &TempDir,
        name: &str,
    ) -> Arc<ResourceManager<MemPageIo<PrefixOrderedIndex>, PrefixOrderedIndex>> {
        let index = Arc::new(PrefixOrderedIndex::new(4, 10));
        let io = Arc::new(MemPageIo::new(index.clone()));
        Arc::new(
            ResourceManager::open(name, index, io, dir.path().join(format!("{name}.json")))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_local_stack_commits_through_2pc() {
        let dir = TempDir::new().unwrap();
        let participants = LocalParticipants::new();
        let tm = TransactionManager::new(participants.clone());
        let rm = open_rm(&dir, "FLIGHTS");
        let api = LocalRm::bind("local://flights", rm.clone(), tm.clone(), &participants);

        let xid = tm.start();
        api.create(&xid, "0001", fields([("numAvail", 5)])).await.unwrap();

        let status = tm.commit(&xid).await.unwrap();
        assert_eq!(status, TxnStatus::Committed);
        assert_eq!(
            rm.read_committed("0001").unwrap().int_field("numAvail"),
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_participant_no_vote_aborts_globally() {
        let dir = TempDir::new().unwrap();
        let participants = LocalParticipants::new();
        let tm = TransactionManager::new(participants.clone());
        let rm = open_rm(&dir, "FLIGHTS");
        let api = LocalRm::bind("local://flights", rm.clone(), tm.clone(), &participants);

        // Seed a record, then race two transactions over it.
        let seed = tm.start();
        api.create(&seed, "0001", fields([("numAvail", 1)])).await.unwrap();
        tm.commit(&seed).await.unwrap();

        let x1 = tm.start();
        let x2 = tm.start();
        api.patch(&x1, "0001", fields([("numAvail", 0)])).await.unwrap();
        api.patch(&x2, "0001", fields([("numAvail", 0)])).await.unwrap();

        assert_eq!(tm.commit(&x1).await.unwrap(), TxnStatus::Committed);
        assert_eq!(tm.commit(&x2).await.unwrap(), TxnStatus::Aborted);
        assert_eq!(rm.read_committed("0001").unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_unregistered_endpoint_is_transport_error() {
        let participants = LocalParticipants::new();
        let tm = TransactionManager::new(participants.clone());

        let xid = tm.start();
        tm.enlist(&xid, "local://ghost").unwrap();
        // Prepare cannot reach the participant, so the outcome is abort.
        assert_eq!(tm.commit(&xid).await.unwrap(), TxnStatus::Aborted);
    }
}
