//! Coordination Context
//!
//! Process-wide owner of the simulated cluster. Created at bootstrap,
//! dropped at shutdown, and handed to the transport layer explicitly.
//!
//! Session-facing operations:
//! - session bootstrap against the elected coordinator
//! - schedule reads, which never touch the critical section
//! - guarded registration writes: acquire, write, replicate, release
//! - exam creation placed on the least-loaded node

use std::sync::Arc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::cluster::{
    Abandoned, CoordinatorElector, Grant, LoadBalancer, LogicalClock, MutexManager, Node, NodeSet,
    ReplicationManager, ReplicationReport,
};
use crate::config::Config;
use crate::error::{CoordError, Result};
use crate::store::{InMemoryRecordStore, RecordStore};
use crate::types::{
    ExamDraft, ExamRecord, LeaderInfo, NodeId, NodeSnapshot, Record, ScheduledExam, SessionRecord,
};

pub const REGISTERED: &str = "Registered successfully";
pub const DEFERRED: &str = "Request deferred; waiting for access to register.";
pub const NOT_FOUND: &str = "Exam ID not found";

/// Result of a guarded registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    Registered { record: ScheduledExam, replication: ReplicationReport },
    /// The section is busy; call again to pick up the grant once promoted
    Deferred { position: usize },
    NotFound { key: String },
}

impl WriteOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            WriteOutcome::Registered { .. } => REGISTERED,
            WriteOutcome::Deferred { .. } => DEFERRED,
            WriteOutcome::NotFound { .. } => NOT_FOUND,
        }
    }
}

/// A newly created exam and where it landed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamCreated {
    pub record: ExamRecord,
    pub owner: NodeId,
    pub replication: ReplicationReport,
}

#[derive(Debug)]
pub struct CoordinationContext {
    nodes: NodeSet,
    elector: CoordinatorElector,
    exclusion: MutexManager,
    replication: ReplicationManager,
    balancer: LoadBalancer,
    sessions: DashMap<String, SessionRecord>,
    store: Arc<dyn RecordStore>,
}

impl CoordinationContext {
    /// Bring up the cluster and run the initial election
    pub fn bootstrap(nodes: NodeSet, store: Arc<dyn RecordStore>) -> Result<Self> {
        let elector = CoordinatorElector::new();
        elector.elect(&nodes)?;
        Ok(Self {
            nodes,
            elector,
            exclusion: MutexManager::new(),
            replication: ReplicationManager::new(),
            balancer: LoadBalancer::new(),
            sessions: DashMap::new(),
            store,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = InMemoryRecordStore::with_records(config.exams.iter().cloned());
        Self::bootstrap(NodeSet::bootstrap(config.cluster.node_count), Arc::new(store))
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    pub fn exclusion(&self) -> &MutexManager {
        &self.exclusion
    }

    /// Re-run the election over the (fixed) membership
    pub fn elect(&self) -> Result<NodeId> {
        self.elector.elect(&self.nodes)
    }

    pub fn coordinator(&self) -> Result<&Node> {
        let id = self
            .elector
            .current()
            .ok_or_else(|| CoordError::UnknownCoordinator("no election has run".to_string()))?;
        self.nodes.require(id)
    }

    /// Rendezvous answer: the last elected coordinator
    pub fn resolve_coordinator(&self) -> Result<LeaderInfo> {
        Ok(LeaderInfo::from(self.coordinator()?.id()))
    }

    /// Bind `session_code` to the current coordinator. Repeat calls return
    /// the same code and keep the original binding.
    pub fn initialize_session(&self, session_code: &str) -> Result<String> {
        let coordinator = self.coordinator()?.id();
        match self.sessions.entry(session_code.to_string()) {
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(SessionRecord {
                    session_code: session_code.to_string(),
                    coordinator,
                    created_at: chrono::Utc::now(),
                });
                info!("Assigned new session {} to {}", session_code, coordinator);
            }
        }
        Ok(session_code.to_string())
    }

    pub fn session(&self, session_code: &str) -> Result<SessionRecord> {
        self.sessions
            .get(session_code)
            .map(|record| record.clone())
            .ok_or_else(|| CoordError::UnknownSession(session_code.to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn read_schedule(&self, session_code: &str) -> Result<Vec<ScheduledExam>> {
        self.session(session_code)?;
        info!("Session {} requested the schedule", session_code);
        Ok(self.store.list()?.iter().map(ScheduledExam::from).collect())
    }

    /// Register the session for `record_key` inside the critical section
    /// for that key. A busy section yields `Deferred` without blocking.
    pub fn perform_guarded_write(&self, session_code: &str, record_key: &str) -> Result<WriteOutcome> {
        let session = self.session(session_code)?;
        let node = self.nodes.require(session.coordinator)?;
        let timestamp = LogicalClock::tick(node);

        if let Grant::Deferred { position } = self.exclusion.enter(record_key, session_code, timestamp)? {
            warn!("Session {} deferred on {} at position {}", session_code, record_key, position);
            return Ok(WriteOutcome::Deferred { position });
        }

        let outcome = self.register(node, record_key);
        if let Some(next) = self.exclusion.release_entry(record_key, session_code) {
            info!("Session {} is next to register for {}", next, record_key);
        }
        outcome
    }

    fn register(&self, node: &Node, record_key: &str) -> Result<WriteOutcome> {
        let record = match self.store.register(record_key) {
            Ok(record) => ScheduledExam::from(&record),
            Err(CoordError::RecordNotFound(key)) => return Ok(WriteOutcome::NotFound { key }),
            Err(e) => return Err(e),
        };
        let mut replica = Record::new();
        replica.insert(record.name.clone(), serde_json::to_value(&record)?);
        let replication = self.replication.replicate(node, &replica, &self.nodes);
        Ok(WriteOutcome::Registered { record, replication })
    }

    /// Withdraw a deferred registration, e.g. when the client gives up
    pub fn abandon_guarded_write(&self, session_code: &str, record_key: &str) -> Result<Abandoned> {
        self.session(session_code)?;
        Ok(self.exclusion.abandon(record_key, session_code))
    }

    /// Create an exam owned by the least-loaded node and replicate its
    /// schedule entry and questions to the peers. Placement and the load
    /// charge happen under the balancer's lock.
    pub fn create_exam(&self, draft: ExamDraft) -> Result<ExamCreated> {
        self.balancer.place(&self.nodes, |owner| self.create_on(owner, draft))
    }

    fn create_on(&self, owner: &Node, draft: ExamDraft) -> Result<ExamCreated> {
        let requester = owner.id().to_string();
        let resource = draft.exam_id.clone();
        let timestamp = LogicalClock::tick(owner);

        if let Grant::Deferred { .. } = self.exclusion.request_entry(&resource, &requester, timestamp)? {
            self.exclusion.abandon(&resource, &requester);
            return Err(CoordError::ConflictingRequest { resource, requester });
        }

        let created = self.insert_exam(owner, draft);
        self.exclusion.release_entry(&resource, &requester);
        created
    }

    fn insert_exam(&self, owner: &Node, draft: ExamDraft) -> Result<ExamCreated> {
        let record = self.store.insert(draft)?;
        let mut replica = Record::new();
        replica.insert(record.name.clone(), serde_json::to_value(ScheduledExam::from(&record))?);
        replica.insert(record.questions_key(), serde_json::to_value(&record.questions)?);
        let replication = self.replication.replicate(owner, &replica, &self.nodes);
        info!("Exam {} created on {}", record.name, owner.id());
        Ok(ExamCreated {
            record,
            owner: owner.id(),
            replication,
        })
    }

    pub fn cluster_status(&self) -> Vec<NodeSnapshot> {
        self.nodes.snapshot()
    }
}
