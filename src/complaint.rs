//! Complaint workflow: disputes filed against individual violations.
//!
//! A complaint starts `Pending` and moves exactly once to `Approved` or
//! `Denied`. An approved complaint waives its violation's fine, and a
//! violation can be waived by at most one complaint.
//!
//! Complaints are grouped per violation. Resolution holds the group's lock
//! while it checks siblings and updates the status, so concurrent approvals of
//! two complaints against the same violation cannot both succeed.

use crate::error::{LedgerError, Result};
use crate::ledger::{ViolationId, ViolationLedger};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Complaint identifier, assigned sequentially from 1.
pub type ComplaintId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    Pending,
    Approved,
    Denied,
}

impl ComplaintStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ComplaintStatus::Pending)
    }
}

/// Administrator decision on a pending complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Uphold the complaint and waive the violation's fine.
    Approve,
    /// Reject the complaint; the fine stands.
    Deny,
}

impl Outcome {
    fn status(self) -> ComplaintStatus {
        match self {
            Outcome::Approve => ComplaintStatus::Approved,
            Outcome::Deny => ComplaintStatus::Denied,
        }
    }
}

/// A dispute against one violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub violation_id: ViolationId,
    pub complainant_email: String,
    pub message: String,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolver_id: Option<String>,
}

type ComplaintGroup = Arc<Mutex<Vec<Complaint>>>;

fn lock(group: &ComplaintGroup) -> MutexGuard<'_, Vec<Complaint>> {
    group.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Told about every complaint that leaves the pending state, e.g. to notify
/// the complainant.
pub trait ResolutionListener: Send + Sync {
    fn complaint_resolved(&self, complaint: &Complaint);
}

impl<F> ResolutionListener for F
where
    F: Fn(&Complaint) + Send + Sync,
{
    fn complaint_resolved(&self, complaint: &Complaint) {
        self(complaint)
    }
}

/// Owns every complaint and enforces the resolution rules.
pub struct ComplaintWorkflow {
    ledger: Arc<ViolationLedger>,
    next_id: AtomicU32,
    groups: RwLock<HashMap<ViolationId, ComplaintGroup>>,
    index: RwLock<HashMap<ComplaintId, ViolationId>>,
    listeners: RwLock<Vec<Arc<dyn ResolutionListener>>>,
}

impl fmt::Debug for ComplaintWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplaintWorkflow")
            .field("ledger", &self.ledger)
            .field("complaints", &self.len())
            .finish_non_exhaustive()
    }
}

impl ComplaintWorkflow {
    /// Creates an empty workflow over the given ledger.
    pub fn new(ledger: Arc<ViolationLedger>) -> Self {
        ComplaintWorkflow {
            ledger,
            next_id: AtomicU32::new(1),
            groups: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn group(&self, violation_id: ViolationId) -> Option<ComplaintGroup> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&violation_id)
            .cloned()
    }

    fn violation_of(&self, complaint_id: ComplaintId) -> Result<ViolationId> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&complaint_id)
            .copied()
            .ok_or_else(|| LedgerError::not_found("complaint", complaint_id))
    }

    /// Files a new pending complaint against a violation.
    ///
    /// Other complaints against the same violation, in any state, do not
    /// prevent filing.
    pub fn file_complaint(
        &self,
        violation_id: ViolationId,
        complainant_email: &str,
        message: &str,
    ) -> Result<Complaint> {
        let email = complainant_email.trim();
        let message = message.trim();
        if email.is_empty() || message.is_empty() {
            return Err(LedgerError::InvalidInput(
                "complaint requires an email and a message".to_string(),
            ));
        }
        if !self.ledger.contains(violation_id) {
            return Err(LedgerError::not_found("violation", violation_id));
        }

        let complaint = Complaint {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            violation_id,
            complainant_email: email.to_string(),
            message: message.to_string(),
            status: ComplaintStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolver_id: None,
        };

        let group = {
            let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(groups.entry(violation_id).or_default())
        };
        lock(&group).push(complaint.clone());
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(complaint.id, violation_id);

        debug!(
            "Complaint {} filed against violation {} by {}",
            complaint.id, violation_id, complaint.complainant_email
        );
        Ok(complaint)
    }

    /// Resolves a pending complaint.
    ///
    /// Fails with `AlreadyResolved` when the complaint is not pending, and with
    /// `ViolationAlreadyWaived` when a sibling complaint has been approved.
    pub fn resolve(
        &self,
        complaint_id: ComplaintId,
        outcome: Outcome,
        resolver_id: &str,
    ) -> Result<Complaint> {
        let violation_id = self.violation_of(complaint_id)?;
        let group = self
            .group(violation_id)
            .ok_or_else(|| LedgerError::not_found("complaint", complaint_id))?;

        let mut complaints = lock(&group);
        let approved = complaints
            .iter()
            .find(|c| c.status == ComplaintStatus::Approved)
            .map(|c| c.id);

        let complaint = complaints
            .iter_mut()
            .find(|c| c.id == complaint_id)
            .ok_or_else(|| LedgerError::not_found("complaint", complaint_id))?;

        if complaint.status.is_terminal() {
            return Err(LedgerError::AlreadyResolved(complaint_id));
        }
        if let Some(approved_by) = approved {
            return Err(LedgerError::ViolationAlreadyWaived {
                violation: violation_id,
                approved_by,
            });
        }

        complaint.status = outcome.status();
        complaint.resolved_at = Some(Utc::now());
        complaint.resolver_id = Some(resolver_id.to_string());
        let resolved = complaint.clone();
        drop(complaints);

        debug!(
            "Complaint {} on violation {} resolved as {:?} by {}",
            complaint_id, violation_id, resolved.status, resolver_id
        );
        self.notify(&resolved);
        Ok(resolved)
    }

    /// Registers a listener called after every successful resolution.
    ///
    /// Listeners run on the resolving thread once the violation's lock has
    /// been released, so they may read the workflow.
    pub fn subscribe(&self, listener: impl ResolutionListener + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    fn notify(&self, complaint: &Complaint) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.complaint_resolved(complaint);
        }
    }

    /// Returns `true` if an approved complaint waives the violation.
    pub fn is_waived(&self, violation_id: ViolationId) -> bool {
        self.waived_by(violation_id).is_some()
    }

    /// The approved complaint waiving a violation, if any.
    pub fn waived_by(&self, violation_id: ViolationId) -> Option<ComplaintId> {
        let group = self.group(violation_id)?;
        let approved = lock(&group)
            .iter()
            .find(|c| c.status == ComplaintStatus::Approved)
            .map(|c| c.id);
        approved
    }

    pub fn get(&self, complaint_id: ComplaintId) -> Result<Complaint> {
        let violation_id = self.violation_of(complaint_id)?;
        self.complaints_for(violation_id)
            .into_iter()
            .find(|c| c.id == complaint_id)
            .ok_or_else(|| LedgerError::not_found("complaint", complaint_id))
    }

    /// Complaints against a violation in filing order.
    pub fn complaints_for(&self, violation_id: ViolationId) -> Vec<Complaint> {
        let mut complaints = self
            .group(violation_id)
            .map(|group| lock(&group).clone())
            .unwrap_or_default();
        complaints.sort_by_key(|c| c.id);
        complaints
    }

    /// Every pending complaint in filing order.
    pub fn pending(&self) -> Vec<Complaint> {
        let groups: Vec<ComplaintGroup> = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut pending: Vec<Complaint> = groups
            .iter()
            .flat_map(|group| {
                lock(group)
                    .iter()
                    .filter(|c| c.status == ComplaintStatus::Pending)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        pending.sort_by_key(|c| c.id);
        pending
    }

    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ErrorCatalog, ErrorCode};
    use crate::money::Vnd;
    use chrono::Weekday;
    use std::sync::Barrier;
    use std::thread;

    fn setup() -> (Arc<ViolationLedger>, ComplaintWorkflow) {
        let catalog =
            ErrorCatalog::from_entries([ErrorCode::new("E1", Vnd::new(50), "first")]).unwrap();
        let ledger = Arc::new(ViolationLedger::new(catalog));
        ledger.record_violation("an", 1, Weekday::Mon, "E1").unwrap();
        ledger.record_violation("an", 1, Weekday::Tue, "E1").unwrap();
        let workflow = ComplaintWorkflow::new(Arc::clone(&ledger));
        (ledger, workflow)
    }

    #[test]
    fn test_file_complaint_starts_pending() {
        let (_, workflow) = setup();
        let complaint = workflow
            .file_complaint(1, "an@example.com", "I was on time")
            .unwrap();

        assert_eq!(complaint.id, 1);
        assert_eq!(complaint.status, ComplaintStatus::Pending);
        assert!(complaint.resolved_at.is_none());
        assert!(complaint.resolver_id.is_none());
        assert!(!workflow.is_waived(1));
    }

    #[test]
    fn test_file_complaint_unknown_violation() {
        let (_, workflow) = setup();
        assert!(matches!(
            workflow.file_complaint(99, "an@example.com", "?"),
            Err(LedgerError::NotFound { entity: "violation", .. })
        ));
        assert!(workflow.is_empty());
    }

    #[test]
    fn test_file_complaint_requires_email_and_message() {
        let (_, workflow) = setup();
        assert!(matches!(
            workflow.file_complaint(1, "  ", "message"),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            workflow.file_complaint(1, "an@example.com", ""),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_approve_waives_violation() {
        let (_, workflow) = setup();
        let complaint = workflow.file_complaint(2, "an@example.com", "wrong day").unwrap();
        let resolved = workflow.resolve(complaint.id, Outcome::Approve, "admin").unwrap();

        assert_eq!(resolved.status, ComplaintStatus::Approved);
        assert_eq!(resolved.resolver_id.as_deref(), Some("admin"));
        assert!(resolved.resolved_at.is_some());
        assert!(workflow.is_waived(2));
        assert!(!workflow.is_waived(1));
        assert_eq!(workflow.waived_by(2), Some(complaint.id));
    }

    #[test]
    fn test_deny_keeps_fine() {
        let (_, workflow) = setup();
        let complaint = workflow.file_complaint(1, "an@example.com", "no").unwrap();
        let resolved = workflow.resolve(complaint.id, Outcome::Deny, "admin").unwrap();

        assert_eq!(resolved.status, ComplaintStatus::Denied);
        assert!(!workflow.is_waived(1));
    }

    #[test]
    fn test_resolving_twice_fails_regardless_of_outcome() {
        let (_, workflow) = setup();
        let approved = workflow.file_complaint(1, "a@example.com", "one").unwrap();
        let denied = workflow.file_complaint(2, "a@example.com", "two").unwrap();
        workflow.resolve(approved.id, Outcome::Approve, "admin").unwrap();
        workflow.resolve(denied.id, Outcome::Deny, "admin").unwrap();

        for outcome in [Outcome::Approve, Outcome::Deny] {
            assert!(matches!(
                workflow.resolve(approved.id, outcome, "admin"),
                Err(LedgerError::AlreadyResolved(id)) if id == approved.id
            ));
            assert!(matches!(
                workflow.resolve(denied.id, outcome, "admin"),
                Err(LedgerError::AlreadyResolved(id)) if id == denied.id
            ));
        }
        assert_eq!(workflow.get(denied.id).unwrap().status, ComplaintStatus::Denied);
    }

    #[test]
    fn test_sibling_approval_rejected() {
        let (_, workflow) = setup();
        let first = workflow.file_complaint(1, "a@example.com", "first").unwrap();
        let second = workflow.file_complaint(1, "b@example.com", "second").unwrap();

        workflow.resolve(first.id, Outcome::Approve, "admin").unwrap();
        assert!(matches!(
            workflow.resolve(second.id, Outcome::Approve, "admin"),
            Err(LedgerError::ViolationAlreadyWaived { violation: 1, approved_by }) if approved_by == first.id
        ));
        assert!(matches!(
            workflow.resolve(second.id, Outcome::Deny, "admin"),
            Err(LedgerError::ViolationAlreadyWaived { .. })
        ));
        assert_eq!(workflow.get(second.id).unwrap().status, ComplaintStatus::Pending);
    }

    #[test]
    fn test_denied_sibling_does_not_block_approval() {
        let (_, workflow) = setup();
        let first = workflow.file_complaint(1, "a@example.com", "first").unwrap();
        workflow.resolve(first.id, Outcome::Deny, "admin").unwrap();

        let second = workflow.file_complaint(1, "a@example.com", "again").unwrap();
        workflow.resolve(second.id, Outcome::Approve, "admin").unwrap();
        assert!(workflow.is_waived(1));
    }

    #[test]
    fn test_listeners_see_each_resolution_once() {
        let (_, workflow) = setup();
        let workflow = Arc::new(workflow);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let reader = Arc::clone(&workflow);
        workflow.subscribe(move |complaint: &Complaint| {
            // Reading the workflow from a listener must not deadlock.
            let waived = reader.is_waived(complaint.violation_id);
            sink.lock().unwrap().push((
                complaint.id,
                complaint.status,
                complaint.complainant_email.clone(),
                waived,
            ));
        });

        let first = workflow.file_complaint(1, "a@example.com", "first").unwrap();
        let sibling = workflow.file_complaint(1, "b@example.com", "second").unwrap();
        let other = workflow.file_complaint(2, "c@example.com", "third").unwrap();

        workflow.resolve(first.id, Outcome::Approve, "admin").unwrap();
        assert!(workflow.resolve(sibling.id, Outcome::Deny, "admin").is_err());
        assert!(workflow.resolve(first.id, Outcome::Deny, "admin").is_err());
        workflow.resolve(other.id, Outcome::Deny, "admin").unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            [
                (first.id, ComplaintStatus::Approved, "a@example.com".to_string(), true),
                (other.id, ComplaintStatus::Denied, "c@example.com".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_resolve_unknown_complaint() {
        let (_, workflow) = setup();
        assert!(matches!(
            workflow.resolve(7, Outcome::Approve, "admin"),
            Err(LedgerError::NotFound { entity: "complaint", .. })
        ));
    }

    #[test]
    fn test_listing() {
        let (_, workflow) = setup();
        let a = workflow.file_complaint(1, "a@example.com", "a").unwrap();
        let b = workflow.file_complaint(2, "b@example.com", "b").unwrap();
        let c = workflow.file_complaint(1, "c@example.com", "c").unwrap();
        workflow.resolve(b.id, Outcome::Deny, "admin").unwrap();

        let on_first: Vec<_> = workflow.complaints_for(1).iter().map(|c| c.id).collect();
        assert_eq!(on_first, [a.id, c.id]);

        let pending: Vec<_> = workflow.pending().iter().map(|c| c.id).collect();
        assert_eq!(pending, [a.id, c.id]);
        assert_eq!(workflow.len(), 3);
    }

    #[test]
    fn test_concurrent_sibling_approvals_admit_one() {
        for _ in 0..50 {
            let (_, workflow) = setup();
            let first = workflow.file_complaint(1, "a@example.com", "first").unwrap();
            let second = workflow.file_complaint(1, "b@example.com", "second").unwrap();
            let barrier = Barrier::new(2);

            let results: Vec<Result<Complaint>> = thread::scope(|s| {
                let handles: Vec<_> = [first.id, second.id]
                    .into_iter()
                    .map(|id| {
                        let workflow = &workflow;
                        let barrier = &barrier;
                        s.spawn(move || {
                            barrier.wait();
                            workflow.resolve(id, Outcome::Approve, "admin")
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let approved = results.iter().filter(|r| r.is_ok()).count();
            let waived = results
                .iter()
                .filter(|r| matches!(r, Err(LedgerError::ViolationAlreadyWaived { .. })))
                .count();
            assert_eq!(approved, 1);
            assert_eq!(waived, 1);

            let approved_now = workflow
                .complaints_for(1)
                .iter()
                .filter(|c| c.status == ComplaintStatus::Approved)
                .count();
            assert_eq!(approved_now, 1);
        }
    }
}
