use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock as IndexLock};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use whistle_shared::types::pagination::PaginationParams;

use crate::lifecycle::{self, InvalidTransition, ReportStatus};
use crate::models::{Author, Message, Report, StatusChange};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("tracking id already exists")]
    DuplicateId,
    #[error("report not found")]
    NotFound,
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("report is {0} and accepts no further changes")]
    ReportTerminal(ReportStatus),
    #[error("report is assigned to another case handler")]
    NotAssigned,
}

/// Who is changing a report.
///
/// A case handler may only work on reports that are unassigned or assigned to
/// them; supervisors and the reporter are not bound by assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Reporter,
    Handler(Uuid),
    Supervisor(Uuid),
}

impl Actor {
    pub fn author(&self) -> Author {
        match self {
            Actor::Reporter => Author::Reporter,
            Actor::Handler(_) | Actor::Supervisor(_) => Author::CaseHandler,
        }
    }

    pub fn staff_id(&self) -> Option<Uuid> {
        match self {
            Actor::Reporter => None,
            Actor::Handler(id) | Actor::Supervisor(id) => Some(*id),
        }
    }
}

type Record = Arc<RwLock<Report>>;

/// In-memory report store.
///
/// Every record lives behind its own async lock. The index lock is
/// synchronous and only held long enough to find or insert a record, never
/// across an await, so work on one report never waits on another.
#[derive(Default)]
pub struct ReportStore {
    reports: IndexLock<HashMap<String, Record>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, report: Report) -> Result<String, StoreError> {
        self.try_insert(report).map_err(|_| StoreError::DuplicateId)
    }

    /// Insert unless the tracking ID is taken, in which case the report is
    /// handed back untouched so the caller can re-key it.
    pub fn try_insert(&self, report: Report) -> Result<String, Report> {
        let mut reports = self.reports.write().unwrap_or_else(PoisonError::into_inner);
        if reports.contains_key(&report.tracking_id) {
            return Err(report);
        }
        let tracking_id = report.tracking_id.clone();
        reports.insert(tracking_id.clone(), Arc::new(RwLock::new(report)));
        Ok(tracking_id)
    }

    pub fn contains(&self, tracking_id: &str) -> bool {
        self.index().contains_key(tracking_id)
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Record>> {
        self.reports.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, tracking_id: &str) -> Option<Record> {
        self.index().get(tracking_id).cloned()
    }

    /// Consistent copy of a report. Callers facing reporters must go through
    /// the access gate instead.
    pub async fn get(&self, tracking_id: &str) -> Option<Report> {
        let record = self.record(tracking_id)?;
        let report = record.read().await;
        Some(report.clone())
    }

    /// Run `f` against a report under its read lock without copying it.
    /// `None` means the ID is unknown.
    pub async fn inspect<R>(&self, tracking_id: &str, f: impl FnOnce(&Report) -> R) -> Option<R> {
        let record = self.record(tracking_id)?;
        let report = record.read().await;
        Some(f(&report))
    }

    pub async fn update_status(
        &self,
        tracking_id: &str,
        to: ReportStatus,
        actor: Actor,
    ) -> Result<Report, StoreError> {
        self.mutate(tracking_id, actor, |report| {
            if lifecycle::requires_message(report.status, to) {
                return Err(InvalidTransition { from: report.status, to }.into());
            }
            apply_transition(report, to, actor.author())
        })
        .await
    }

    /// Move to `to` and append `content` from `actor` as one step.
    pub async fn transition_with_message(
        &self,
        tracking_id: &str,
        to: ReportStatus,
        actor: Actor,
        content: String,
    ) -> Result<Report, StoreError> {
        self.mutate(tracking_id, actor, |report| {
            apply_transition(report, to, actor.author())?;
            push_message(report, actor.author(), content);
            Ok(())
        })
        .await
    }

    pub async fn append_message(
        &self,
        tracking_id: &str,
        actor: Actor,
        content: String,
    ) -> Result<Report, StoreError> {
        self.mutate(tracking_id, actor, |report| {
            if report.status.is_terminal() {
                return Err(StoreError::ReportTerminal(report.status));
            }
            push_message(report, actor.author(), content);
            Ok(())
        })
        .await
    }

    /// Take a pending report into review and record who picked it up.
    pub async fn acknowledge(&self, tracking_id: &str, actor: Actor) -> Result<Report, StoreError> {
        self.mutate(tracking_id, actor, |report| {
            apply_transition(report, ReportStatus::UnderReview, actor.author())?;
            report.assigned_handler = actor.staff_id();
            Ok(())
        })
        .await
    }

    /// Reports ordered newest first, optionally restricted to one status.
    pub async fn list(
        &self,
        status: Option<ReportStatus>,
        pagination: &PaginationParams,
    ) -> (Vec<Report>, u64) {
        let records: Vec<Record> = self.index().values().cloned().collect();

        let mut matching = Vec::with_capacity(records.len());
        for record in records {
            let report = record.read().await;
            if status.map_or(true, |s| report.status == s) {
                matching.push(report.clone());
            }
        }
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();
        (page, total)
    }

    /// Run `f` under the record's write lock. On error the record is left
    /// exactly as it was; on success `updated_at` is bumped in the same
    /// critical section.
    async fn mutate<F>(&self, tracking_id: &str, actor: Actor, f: F) -> Result<Report, StoreError>
    where
        F: FnOnce(&mut Report) -> Result<(), StoreError>,
    {
        let record = self.record(tracking_id).ok_or(StoreError::NotFound)?;
        let mut report = record.write().await;

        if let (Actor::Handler(staff), Some(owner)) = (actor, report.assigned_handler) {
            if staff != owner {
                return Err(StoreError::NotAssigned);
            }
        }

        let mut draft = report.clone();
        f(&mut draft)?;
        draft.updated_at = Utc::now();
        *report = draft;

        Ok(report.clone())
    }
}

fn apply_transition(report: &mut Report, to: ReportStatus, actor: Author) -> Result<(), StoreError> {
    let from = report.status;
    lifecycle::check_transition(from, to, actor)?;
    report.status = to;
    report.history.push(StatusChange { from, to, at: Utc::now() });
    Ok(())
}

fn push_message(report: &mut Report, author: Author, content: String) {
    report.messages.push(Message {
        author,
        content,
        created_at: Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ContactPreference, NewReport};

    const SUPERVISOR: Actor = Actor::Supervisor(Uuid::nil());

    fn report(id: &str) -> Report {
        Report::new(
            id.to_string(),
            "ab".repeat(32),
            NewReport {
                category: Category::Fraud,
                description: "Ten or more characters describing the issue.".into(),
                incident_date: None,
                location: None,
                people_involved: None,
                attachments: vec![],
                contact: ContactPreference::None,
            },
        )
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let store = ReportStore::new();
        store.create(report("WB-000000000001")).unwrap();
        let err = store.create(report("WB-000000000001")).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId);
        assert!(store.contains("WB-000000000001"));

        let mut rejected = store.try_insert(report("WB-000000000001")).unwrap_err();
        rejected.tracking_id = "WB-000000000010".into();
        assert_eq!(store.try_insert(rejected).unwrap(), "WB-000000000010");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn inspect_reads_without_cloning_the_report() {
        let store = ReportStore::new();
        let id = store.create(report("WB-000000000011")).unwrap();
        let digest_len = store.inspect(&id, |r| r.access_token_hash.len()).await;
        assert_eq!(digest_len, Some(64));
        assert_eq!(store.inspect("WB-000000000404", |r| r.status).await, None);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = ReportStore::new();
        assert!(store.get("WB-000000000404").await.is_none());
        let err = store
            .update_status("WB-000000000404", ReportStatus::UnderReview, SUPERVISOR)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn transition_records_history_and_bumps_updated_at() {
        let store = ReportStore::new();
        let id = store.create(report("WB-000000000002")).unwrap();
        let before = store.get(&id).await.unwrap();

        let after = store
            .update_status(&id, ReportStatus::UnderReview, SUPERVISOR)
            .await
            .unwrap();

        assert_eq!(after.status, ReportStatus::UnderReview);
        assert_eq!(after.history.len(), 1);
        assert_eq!(after.history[0].from, ReportStatus::Pending);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn acknowledge_assigns_handler_once() {
        let store = ReportStore::new();
        let id = store.create(report("WB-000000000008")).unwrap();
        let handler = Uuid::new_v4();

        let r = store.acknowledge(&id, Actor::Handler(handler)).await.unwrap();
        assert_eq!(r.status, ReportStatus::UnderReview);
        assert_eq!(r.assigned_handler, Some(handler));

        let err = store.acknowledge(&id, Actor::Handler(handler)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        assert_eq!(store.get(&id).await.unwrap().assigned_handler, Some(handler));
    }

    #[tokio::test]
    async fn other_handlers_cannot_touch_assigned_report() {
        let store = ReportStore::new();
        let id = store.create(report("WB-000000000009")).unwrap();
        let owner = Uuid::new_v4();
        store.acknowledge(&id, Actor::Handler(owner)).await.unwrap();

        let err = store
            .append_message(&id, Actor::Handler(Uuid::new_v4()), "not mine".into())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotAssigned);

        // owner, supervisor and reporter are not bound by assignment
        store.append_message(&id, Actor::Handler(owner), "mine".into()).await.unwrap();
        store.append_message(&id, Actor::Supervisor(Uuid::new_v4()), "oversight".into()).await.unwrap();
        store
            .transition_with_message(&id, ReportStatus::AwaitingInfo, Actor::Handler(owner), "dates?".into())
            .await
            .unwrap();
        let r = store
            .transition_with_message(&id, ReportStatus::UnderReview, Actor::Reporter, "March".into())
            .await
            .unwrap();
        assert_eq!(r.messages.len(), 4);
        assert_eq!(r.messages[3].author, Author::Reporter);
    }

    #[tokio::test]
    async fn request_info_needs_a_message() {
        let store = ReportStore::new();
        let id = store.create(report("WB-000000000003")).unwrap();
        store.update_status(&id, ReportStatus::UnderReview, SUPERVISOR).await.unwrap();

        let err = store
            .update_status(&id, ReportStatus::AwaitingInfo, SUPERVISOR)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));

        let r = store
            .transition_with_message(&id, ReportStatus::AwaitingInfo, SUPERVISOR, "Please clarify dates".into())
            .await
            .unwrap();
        assert_eq!(r.status, ReportStatus::AwaitingInfo);
        assert_eq!(r.messages.len(), 1);
        assert_eq!(r.messages[0].author, Author::CaseHandler);
    }

    #[tokio::test]
    async fn failed_transition_leaves_record_untouched() {
        let store = ReportStore::new();
        let id = store.create(report("WB-000000000004")).unwrap();
        let before = store.get(&id).await.unwrap();

        let err = store
            .transition_with_message(&id, ReportStatus::UnderReview, Actor::Reporter, "hello".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));

        let after = store.get(&id).await.unwrap();
        assert_eq!(after.status, ReportStatus::Pending);
        assert!(after.messages.is_empty());
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn terminal_report_rejects_messages() {
        let store = ReportStore::new();
        let id = store.create(report("WB-000000000005")).unwrap();
        store.update_status(&id, ReportStatus::Closed, SUPERVISOR).await.unwrap();

        let err = store
            .append_message(&id, SUPERVISOR, "late note".into())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::ReportTerminal(ReportStatus::Closed));

        let err = store
            .update_status(&id, ReportStatus::UnderReview, SUPERVISOR)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        assert_eq!(store.get(&id).await.unwrap().status, ReportStatus::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_have_one_winner() {
        let store = Arc::new(ReportStore::new());
        let id = store.create(report("WB-000000000006")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.update_status(&id, ReportStatus::UnderReview, SUPERVISOR).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let r = store.get(&id).await.unwrap();
        assert_eq!(r.status, ReportStatus::UnderReview);
        assert_eq!(r.history.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_not_lost() {
        let store = Arc::new(ReportStore::new());
        let id = store.create(report("WB-000000000007")).unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.append_message(&id, SUPERVISOR, format!("note {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get(&id).await.unwrap().messages.len(), 50);
    }

    #[tokio::test]
    async fn list_filters_and_pages() {
        let store = ReportStore::new();
        for i in 0..5 {
            store.create(report(&format!("WB-00000000010{i}"))).unwrap();
        }
        store
            .update_status("WB-000000000100", ReportStatus::UnderReview, SUPERVISOR)
            .await
            .unwrap();

        let (all, total) = store.list(None, &PaginationParams { page: 1, per_page: 2 }).await;
        assert_eq!(total, 5);
        assert_eq!(all.len(), 2);

        let (reviewing, total) = store
            .list(Some(ReportStatus::UnderReview), &PaginationParams::default())
            .await;
        assert_eq!(total, 1);
        assert_eq!(reviewing[0].tracking_id, "WB-000000000100");
    }
}
