//! Distributed Mutual Exclusion
//!
//! A single arbiter in the Ricart-Agrawala style, reduced to what the
//! exam service needs:
//! - at most one holder per resource
//! - contenders queue ordered by request timestamp, ties by requester id
//! - a holder is never preempted, whatever its timestamp
//! - a release hands the section straight to the head of the queue
//!
//! `CriticalSection` is the plain state machine; `MutexManager` keeps one
//! per resource behind its own lock and is the serialisation point for
//! concurrent callers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::error::{CoordError, Result};
use crate::types::{RequesterId, Timestamp};

/// Outcome of asking for a critical section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    Granted,
    /// Queued; `position` is 0 for the next in line
    Deferred { position: usize },
}

/// A queued claim on a critical section. Ordering is the promotion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CriticalSectionRequest {
    pub timestamp: Timestamp,
    pub requester: RequesterId,
}

/// What `abandon` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Abandoned {
    /// Removed from the queue
    Dequeued,
    /// Gave up a handed-over grant; `next` is the newly promoted holder
    Released { next: Option<RequesterId> },
    /// Holds the section and is inside it; must release instead
    Held,
    NotPresent,
}

#[derive(Debug, Clone)]
struct Holder {
    requester: RequesterId,
    timestamp: Timestamp,
    /// False between a promotion on release and the promoted requester
    /// coming back for its grant
    claimed: bool,
}

#[derive(Debug, Clone)]
pub struct CriticalSection {
    resource: String,
    holder: Option<Holder>,
    queue: BTreeSet<CriticalSectionRequest>,
    queued: HashMap<RequesterId, Timestamp>,
}

impl CriticalSection {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            holder: None,
            queue: BTreeSet::new(),
            queued: HashMap::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn holder(&self) -> Option<&str> {
        self.holder.as_ref().map(|h| h.requester.as_str())
    }

    pub fn holder_timestamp(&self) -> Option<Timestamp> {
        self.holder.as_ref().map(|h| h.timestamp)
    }

    pub fn is_free(&self) -> bool {
        self.holder.is_none()
    }

    /// Queued requests in promotion order
    pub fn pending(&self) -> Vec<CriticalSectionRequest> {
        self.queue.iter().cloned().collect()
    }

    pub fn position(&self, requester: &str) -> Option<usize> {
        let timestamp = *self.queued.get(requester)?;
        let key = CriticalSectionRequest { timestamp, requester: requester.to_string() };
        Some(self.queue.range(..key).count())
    }

    fn conflict(&self, requester: &str) -> CoordError {
        CoordError::ConflictingRequest {
            resource: self.resource.clone(),
            requester: requester.to_string(),
        }
    }

    /// Grant if free, otherwise queue. A requester that already holds or
    /// waits is rejected.
    pub fn request_entry(&mut self, requester: &str, timestamp: Timestamp) -> Result<Grant> {
        if self.holder() == Some(requester) || self.queued.contains_key(requester) {
            return Err(self.conflict(requester));
        }

        if self.holder.is_none() {
            self.holder = Some(Holder {
                requester: requester.to_string(),
                timestamp,
                claimed: true,
            });
            info!("{} granted {} (ts={})", requester, self.resource, timestamp);
            return Ok(Grant::Granted);
        }

        let request = CriticalSectionRequest { timestamp, requester: requester.to_string() };
        self.queued.insert(request.requester.clone(), timestamp);
        self.queue.insert(request);
        let position = self.position(requester).unwrap_or(0);
        info!(
            "{} deferred on {} (ts={}), queue length {}",
            requester,
            self.resource,
            timestamp,
            self.queue.len()
        );
        Ok(Grant::Deferred { position })
    }

    /// Like `request_entry`, but a requester promoted by an earlier release
    /// picks up its grant, and one still queued gets its current position.
    pub fn enter(&mut self, requester: &str, timestamp: Timestamp) -> Result<Grant> {
        let held = self
            .holder
            .as_ref()
            .filter(|h| h.requester == requester)
            .map(|h| h.claimed);
        match held {
            Some(true) => return Err(self.conflict(requester)),
            Some(false) => {
                if let Some(holder) = self.holder.as_mut() {
                    holder.claimed = true;
                }
                debug!("{} resumed handed-over grant on {}", requester, self.resource);
                return Ok(Grant::Granted);
            }
            None => {}
        }
        if let Some(position) = self.position(requester) {
            return Ok(Grant::Deferred { position });
        }
        self.request_entry(requester, timestamp)
    }

    /// Release held by `requester`; a non-holder gets `DoubleRelease` and
    /// nothing changes.
    pub fn release_strict(&mut self, requester: &str) -> Result<Option<RequesterId>> {
        if self.holder() != Some(requester) {
            return Err(CoordError::DoubleRelease {
                resource: self.resource.clone(),
                requester: requester.to_string(),
            });
        }
        info!("{} released {}", requester, self.resource);
        self.holder = None;
        Ok(self.promote_next())
    }

    /// Release, treating a release by a non-holder as a silent no-op.
    /// Returns the requester promoted to holder, if any.
    pub fn release_entry(&mut self, requester: &str) -> Option<RequesterId> {
        match self.release_strict(requester) {
            Ok(next) => next,
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    /// Withdraw a request the caller no longer wants
    pub fn abandon(&mut self, requester: &str) -> Abandoned {
        if let Some(timestamp) = self.queued.remove(requester) {
            self.queue.remove(&CriticalSectionRequest {
                timestamp,
                requester: requester.to_string(),
            });
            info!("{} abandoned its request on {}", requester, self.resource);
            return Abandoned::Dequeued;
        }
        let claimed = match &self.holder {
            Some(holder) if holder.requester == requester => holder.claimed,
            _ => return Abandoned::NotPresent,
        };
        if claimed {
            return Abandoned::Held;
        }
        self.holder = None;
        info!("{} abandoned handed-over grant on {}", requester, self.resource);
        Abandoned::Released { next: self.promote_next() }
    }

    fn promote_next(&mut self) -> Option<RequesterId> {
        let next = self.queue.pop_first()?;
        self.queued.remove(&next.requester);
        info!(
            "{} granted {} after release (ts={})",
            next.requester, self.resource, next.timestamp
        );
        self.holder = Some(Holder {
            requester: next.requester.clone(),
            timestamp: next.timestamp,
            claimed: false,
        });
        Some(next.requester)
    }
}

/// Per-resource critical sections, each behind its own lock
#[derive(Debug, Default)]
pub struct MutexManager {
    sections: DashMap<String, Arc<Mutex<CriticalSection>>>,
}

impl MutexManager {
    pub fn new() -> Self {
        Self::default()
    }

    // Sections are never removed once created, so every caller for a
    // resource always contends on the same lock.
    fn section(&self, resource: &str) -> Arc<Mutex<CriticalSection>> {
        if let Some(section) = self.sections.get(resource) {
            return section.clone();
        }
        self.sections
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CriticalSection::new(resource))))
            .clone()
    }

    pub fn request_entry(&self, resource: &str, requester: &str, timestamp: Timestamp) -> Result<Grant> {
        self.section(resource).lock().request_entry(requester, timestamp)
    }

    pub fn enter(&self, resource: &str, requester: &str, timestamp: Timestamp) -> Result<Grant> {
        self.section(resource).lock().enter(requester, timestamp)
    }

    pub fn release_entry(&self, resource: &str, requester: &str) -> Option<RequesterId> {
        self.section(resource).lock().release_entry(requester)
    }

    pub fn release_strict(&self, resource: &str, requester: &str) -> Result<Option<RequesterId>> {
        self.section(resource).lock().release_strict(requester)
    }

    pub fn abandon(&self, resource: &str, requester: &str) -> Abandoned {
        self.section(resource).lock().abandon(requester)
    }

    pub fn holder(&self, resource: &str) -> Option<RequesterId> {
        let section = self.sections.get(resource)?.clone();
        let holder = section.lock().holder().map(str::to_string);
        holder
    }

    pub fn pending(&self, resource: &str) -> Vec<CriticalSectionRequest> {
        match self.sections.get(resource).map(|section| section.clone()) {
            Some(section) => section.lock().pending(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_then_defer() {
        let mut cs = CriticalSection::new("examX");
        assert_eq!(cs.request_entry("A", 100).unwrap(), Grant::Granted);
        assert_eq!(cs.request_entry("B", 105).unwrap(), Grant::Deferred { position: 0 });
        assert_eq!(cs.holder(), Some("A"));
        assert_eq!(cs.release_entry("A"), Some("B".to_string()));
        assert_eq!(cs.holder(), Some("B"));
        assert!(cs.pending().is_empty());
    }

    #[test]
    fn test_earlier_timestamp_never_preempts() {
        let mut cs = CriticalSection::new("r");
        cs.request_entry("late", 500).unwrap();
        assert_eq!(cs.request_entry("early", 1).unwrap(), Grant::Deferred { position: 0 });
        assert_eq!(cs.holder(), Some("late"));
    }

    #[test]
    fn test_queue_promotes_by_timestamp() {
        let mut cs = CriticalSection::new("r");
        cs.request_entry("holder", 0).unwrap();
        cs.request_entry("t3", 30).unwrap();
        cs.request_entry("t1", 10).unwrap();
        cs.request_entry("t2", 20).unwrap();

        assert_eq!(cs.release_entry("holder").as_deref(), Some("t1"));
        assert_eq!(cs.release_entry("t1").as_deref(), Some("t2"));
        assert_eq!(cs.release_entry("t2").as_deref(), Some("t3"));
        assert_eq!(cs.release_entry("t3"), None);
        assert!(cs.is_free());
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_requester() {
        let mut cs = CriticalSection::new("r");
        cs.request_entry("h", 1).unwrap();
        cs.request_entry("b", 7).unwrap();
        cs.request_entry("a", 7).unwrap();
        assert_eq!(cs.position("a"), Some(0));
        assert_eq!(cs.release_entry("h").as_deref(), Some("a"));
    }

    #[test]
    fn test_release_by_non_holder_is_noop() {
        let mut cs = CriticalSection::new("r");
        cs.request_entry("A", 1).unwrap();
        cs.request_entry("B", 2).unwrap();

        assert_eq!(cs.release_entry("B"), None);
        assert_eq!(cs.release_entry("nobody"), None);
        assert_eq!(cs.holder(), Some("A"));
        assert_eq!(cs.pending().len(), 1);
        assert!(matches!(cs.release_strict("B"), Err(CoordError::DoubleRelease { .. })));
    }

    #[test]
    fn test_conflicting_requests_rejected() {
        let mut cs = CriticalSection::new("r");
        cs.request_entry("A", 1).unwrap();
        cs.request_entry("B", 2).unwrap();
        assert!(matches!(cs.request_entry("A", 3), Err(CoordError::ConflictingRequest { .. })));
        assert!(matches!(cs.request_entry("B", 4), Err(CoordError::ConflictingRequest { .. })));
        assert_eq!(cs.pending().len(), 1);
    }

    #[test]
    fn test_enter_resumes_handed_over_grant_once() {
        let mut cs = CriticalSection::new("r");
        cs.enter("A", 1).unwrap();
        assert_eq!(cs.enter("B", 2).unwrap(), Grant::Deferred { position: 0 });
        // Still waiting: position is reported, nothing is re-queued
        assert_eq!(cs.enter("B", 9).unwrap(), Grant::Deferred { position: 0 });
        cs.release_entry("A");

        assert_eq!(cs.enter("B", 10).unwrap(), Grant::Granted);
        assert!(matches!(cs.enter("B", 11), Err(CoordError::ConflictingRequest { .. })));
    }

    #[test]
    fn test_abandon() {
        let mut cs = CriticalSection::new("r");
        cs.request_entry("A", 1).unwrap();
        cs.request_entry("B", 2).unwrap();
        cs.request_entry("C", 3).unwrap();

        assert_eq!(cs.abandon("B"), Abandoned::Dequeued);
        assert_eq!(cs.abandon("A"), Abandoned::Held);
        assert_eq!(cs.release_entry("A").as_deref(), Some("C"));
        // C was promoted but never came back for the grant
        assert_eq!(cs.abandon("C"), Abandoned::Released { next: None });
        assert!(cs.is_free());
        assert_eq!(cs.abandon("C"), Abandoned::NotPresent);
    }

    #[test]
    fn test_manager_isolates_resources() {
        let manager = MutexManager::new();
        assert_eq!(manager.request_entry("x", "A", 1).unwrap(), Grant::Granted);
        assert_eq!(manager.request_entry("y", "B", 2).unwrap(), Grant::Granted);
        assert_eq!(manager.holder("x").as_deref(), Some("A"));
        assert_eq!(manager.holder("y").as_deref(), Some("B"));
        assert_eq!(manager.holder("z"), None);
        assert!(manager.pending("z").is_empty());
    }

    #[test]
    fn test_manager_concurrent_requesters_single_holder() {
        let manager = Arc::new(MutexManager::new());
        let handles: Vec<_> = (0..16u64)
            .map(|i| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.request_entry("exam", &format!("s{}", i), i).unwrap())
            })
            .collect();
        let grants: Vec<Grant> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(grants.iter().filter(|g| **g == Grant::Granted).count(), 1);
        assert_eq!(manager.pending("exam").len(), 15);
    }
}
