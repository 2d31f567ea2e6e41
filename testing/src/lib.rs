//! In-memory fakes for deterministic FormGate tests.
//!
//! [`MemoryStore`] implements all three store traits behind one mutex, which
//! makes its reserve operation atomic the same way the Postgres transaction
//! is. [`FixedClock`] lets tests advance time manually. The audit sinks
//! record or fail on demand so audit isolation is testable.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use formgate_core::audit::{AuditEvent, AuditSink};
use formgate_core::clock::Clock;
use formgate_core::form::graph::FormTemplate;
use formgate_core::inventory::{InventoryItem, ProvisionItem, ReservationLine};
use formgate_core::store::{
    FormBinding, FormCatalog, InventoryKey, InventoryLedger, LimitError, Offering, ResolvedForm,
    ReserveError, StoreError, SubmissionStore,
};
use formgate_core::submission::Submission;
use formgate_core::types::{ChoiceId, OfferingId, ShareToken, StepId, SubmissionId, TemplateId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type InventoryMap = BTreeMap<(OfferingId, StepId, ChoiceId), InventoryItem>;

#[derive(Default)]
struct Inner {
    templates: BTreeMap<TemplateId, FormTemplate>,
    offerings: BTreeMap<OfferingId, Offering>,
    bindings: Vec<FormBinding>,
    inventory: InventoryMap,
    submissions: Vec<Submission>,
}

/// In-memory implementation of the catalog, ledger, and submission store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".to_string()))
    }

    /// Current counter value for a key, for test assertions.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lock is poisoned.
    pub fn total_ordered(&self, key: &InventoryKey) -> Result<Option<u32>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .inventory
            .get(&(key.offering_id, key.step_id.clone(), key.choice_id.clone()))
            .map(|item| item.total_ordered))
    }

    /// Number of submission rows, for test assertions.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lock is poisoned.
    pub fn submission_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.submissions.len())
    }
}

#[async_trait]
impl FormCatalog for MemoryStore {
    async fn insert_template(&self, template: &FormTemplate) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn template(&self, id: TemplateId) -> Result<Option<FormTemplate>, StoreError> {
        Ok(self.lock()?.templates.get(&id).cloned())
    }

    async fn insert_offering(&self, offering: &Offering) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.offerings.insert(offering.id, offering.clone());
        Ok(())
    }

    async fn offering(&self, id: OfferingId) -> Result<Option<Offering>, StoreError> {
        Ok(self.lock()?.offerings.get(&id).cloned())
    }

    async fn insert_binding(&self, binding: &FormBinding) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.bindings.push(binding.clone());
        Ok(())
    }

    async fn resolve_share_token(
        &self,
        token: &ShareToken,
    ) -> Result<Option<ResolvedForm>, StoreError> {
        let inner = self.lock()?;
        // Priority: stage-specific, then offering-level, then legacy.
        let rank = |b: &FormBinding| match (&b.offering_id, &b.stage) {
            (Some(_), Some(_)) => 0,
            (Some(_), None) => 1,
            _ => 2,
        };
        let binding = inner
            .bindings
            .iter()
            .filter(|b| b.share_token == *token)
            .min_by_key(|b| rank(b))
            .cloned();
        let Some(binding) = binding else {
            return Ok(None);
        };
        let Some(template) = inner.templates.get(&binding.template_id).cloned() else {
            return Ok(None);
        };
        let offering = binding
            .offering_id
            .and_then(|id| inner.offerings.get(&id).cloned());
        Ok(Some(ResolvedForm {
            binding,
            template,
            offering,
        }))
    }
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn provision(
        &self,
        offering_id: OfferingId,
        items: &[ProvisionItem],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        for item in items {
            let key = (offering_id, item.step_id.clone(), item.choice_id.clone());
            // Idempotent: existing counters and limits stay untouched.
            inner.inventory.entry(key).or_insert_with(|| InventoryItem {
                offering_id,
                step_id: item.step_id.clone(),
                choice_id: item.choice_id.clone(),
                label: item.label.clone(),
                price: item.price,
                total_ordered: 0,
                stock_limit: item.stock_limit,
            });
        }
        Ok(())
    }

    async fn reserve(
        &self,
        offering_id: OfferingId,
        lines: &[ReservationLine],
    ) -> Result<(), ReserveError> {
        let mut inner = self.lock()?;

        // Self-heal missing rows, unbounded until an admin sets a limit.
        for line in lines {
            let key = (offering_id, line.step_id.clone(), line.choice_id.clone());
            inner.inventory.entry(key).or_insert_with(|| InventoryItem {
                offering_id,
                step_id: line.step_id.clone(),
                choice_id: line.choice_id.clone(),
                label: line.label.clone(),
                price: line.price,
                total_ordered: 0,
                stock_limit: None,
            });
        }

        // Fold repeated lines for the same item into one requested total, so
        // duplicates cannot slip past the limit check one line at a time.
        let mut requested: BTreeMap<(StepId, ChoiceId), (u32, &str)> = BTreeMap::new();
        for line in lines {
            let entry = requested
                .entry((line.step_id.clone(), line.choice_id.clone()))
                .or_insert((0, line.label.as_str()));
            entry.0 += line.quantity;
        }

        // All-or-nothing: check every item before mutating any counter. The
        // single lock plays the role of the storage transaction.
        for ((step_id, choice_id), (quantity, label)) in &requested {
            let key = (offering_id, step_id.clone(), choice_id.clone());
            if let Some(item) = inner.inventory.get(&key) {
                if let Some(limit) = item.stock_limit {
                    if item.total_ordered + quantity > limit {
                        return Err(ReserveError::Insufficient {
                            label: (*label).to_string(),
                            remaining: limit.saturating_sub(item.total_ordered),
                        });
                    }
                }
            }
        }

        for ((step_id, choice_id), (quantity, _)) in requested {
            let key = (offering_id, step_id, choice_id);
            if let Some(item) = inner.inventory.get_mut(&key) {
                item.total_ordered += quantity;
            }
        }
        Ok(())
    }

    async fn set_limit(
        &self,
        key: &InventoryKey,
        new_limit: Option<u32>,
    ) -> Result<(), LimitError> {
        let mut inner = self.lock().map_err(LimitError::Store)?;
        let map_key = (key.offering_id, key.step_id.clone(), key.choice_id.clone());
        let Some(item) = inner.inventory.get_mut(&map_key) else {
            return Err(LimitError::NotFound);
        };
        if let Some(limit) = new_limit {
            if limit < item.total_ordered {
                return Err(LimitError::BelowOrdered {
                    total_ordered: item.total_ordered,
                });
            }
        }
        item.stock_limit = new_limit;
        Ok(())
    }

    async fn snapshot(&self, offering_id: OfferingId) -> Result<Vec<InventoryItem>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .inventory
            .values()
            .filter(|item| item.offering_id == offering_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.submissions.push(submission.clone());
        Ok(())
    }

    async fn mark_viewed(&self, id: SubmissionId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.submissions.iter_mut().find(|s| s.id == id) {
            Some(submission) => {
                submission.is_viewed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn by_template(&self, template_id: TemplateId) -> Result<Vec<Submission>, StoreError> {
        let inner = self.lock()?;
        let mut rows: Vec<Submission> = inner
            .submissions
            .iter()
            .filter(|s| s.template_id == template_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

/// A submission store that always fails, for persist-anomaly tests.
#[derive(Clone, Default)]
pub struct FailingSubmissionStore;

#[async_trait]
impl SubmissionStore for FailingSubmissionStore {
    async fn insert(&self, _submission: &Submission) -> Result<(), StoreError> {
        Err(StoreError::Backend("storage outage".to_string()))
    }

    async fn mark_viewed(&self, _id: SubmissionId) -> Result<bool, StoreError> {
        Err(StoreError::Backend("storage outage".to_string()))
    }

    async fn by_template(&self, _template_id: TemplateId) -> Result<Vec<Submission>, StoreError> {
        Err(StoreError::Backend("storage outage".to_string()))
    }
}

/// Manually advanced clock.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Starts the clock at a fixed, arbitrary instant.
    ///
    /// # Panics
    ///
    /// Never panics; the seed timestamp is a valid constant.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    /// Moves the clock forward.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned or the delta overflows; neither happens
    /// in tests.
    #[allow(clippy::unwrap_used)]
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(delta).unwrap();
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FixedClock {
    /// # Panics
    ///
    /// Panics if the lock is poisoned; never happens in tests.
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Audit sink that records every event for assertions.
#[derive(Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned; never happens in tests.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.events
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

/// Audit sink that always fails, for audit-isolation tests.
#[derive(Clone, Default)]
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: AuditEvent) -> Result<(), StoreError> {
        Err(StoreError::Backend("audit sink down".to_string()))
    }
}
