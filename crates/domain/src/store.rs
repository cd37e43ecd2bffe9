//! Record store abstraction and in-memory implementation.
//!
//! The handler chain is written against [`RecordStore`] only; durable
//! backends (SQL, embedded KV) live with the embedding application and
//! implement the same trait. Each method is one transactional store
//! operation — the chain takes no cross-operation transactions and relies on
//! handler idempotency instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use drip_core::{CampaignId, LeadId, OutboxId};

use crate::campaign::Campaign;
use crate::lead::Lead;
use crate::outbox::OutboxEmail;

/// Record store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// An insert collided with an existing unique key.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    /// A record expected to exist did not.
    #[error("record not found")]
    NotFound,
    /// Backend failure (IO, poisoned lock, ...).
    #[error("storage error: {0}")]
    Storage(String),
}

/// Campaign / lead / outbox persistence consumed by the handlers.
pub trait RecordStore: Send + Sync {
    fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError>;

    /// All campaigns currently in `Running` status.
    fn running_campaigns(&self) -> Result<Vec<Campaign>, StoreError>;

    /// Insert or replace a campaign.
    fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    fn lead(&self, id: LeadId) -> Result<Option<Lead>, StoreError>;

    /// Leads of `campaign_id` that are due for a touch at `now`
    /// (contactable state, `next_touch_at <= now`), oldest due first,
    /// capped at `limit`.
    fn due_leads(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Lead>, StoreError>;

    /// Insert or replace a lead.
    fn upsert_lead(&self, lead: &Lead) -> Result<(), StoreError>;

    fn outbox(&self, id: OutboxId) -> Result<Option<OutboxEmail>, StoreError>;

    fn outbox_by_dedupe_key(&self, key: &str) -> Result<Option<OutboxEmail>, StoreError>;

    /// Insert a new outbox record. The dedupe key is unique: inserting a
    /// second record with the same key fails with
    /// [`StoreError::DuplicateKey`].
    fn insert_outbox(&self, record: OutboxEmail) -> Result<OutboxId, StoreError>;

    /// Replace an existing outbox record.
    fn update_outbox(&self, record: &OutboxEmail) -> Result<(), StoreError>;
}

impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        (**self).campaign(id)
    }

    fn running_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        (**self).running_campaigns()
    }

    fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        (**self).upsert_campaign(campaign)
    }

    fn lead(&self, id: LeadId) -> Result<Option<Lead>, StoreError> {
        (**self).lead(id)
    }

    fn due_leads(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Lead>, StoreError> {
        (**self).due_leads(campaign_id, now, limit)
    }

    fn upsert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        (**self).upsert_lead(lead)
    }

    fn outbox(&self, id: OutboxId) -> Result<Option<OutboxEmail>, StoreError> {
        (**self).outbox(id)
    }

    fn outbox_by_dedupe_key(&self, key: &str) -> Result<Option<OutboxEmail>, StoreError> {
        (**self).outbox_by_dedupe_key(key)
    }

    fn insert_outbox(&self, record: OutboxEmail) -> Result<OutboxId, StoreError> {
        (**self).insert_outbox(record)
    }

    fn update_outbox(&self, record: &OutboxEmail) -> Result<(), StoreError> {
        (**self).update_outbox(record)
    }
}

#[derive(Debug, Default)]
struct Records {
    campaigns: HashMap<CampaignId, Campaign>,
    leads: HashMap<LeadId, Lead>,
    outbox: HashMap<OutboxId, OutboxEmail>,
    outbox_by_key: HashMap<String, OutboxId>,
}

/// In-memory record store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Records>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Records>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Storage("record store lock poisoned".into()))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        Ok(self.lock()?.campaigns.get(&id).cloned())
    }

    fn running_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let records = self.lock()?;
        let mut campaigns: Vec<_> = records
            .campaigns
            .values()
            .filter(|c| c.is_running())
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        Ok(campaigns)
    }

    fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        self.lock()?
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    fn lead(&self, id: LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.lock()?.leads.get(&id).cloned())
    }

    fn due_leads(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Lead>, StoreError> {
        let records = self.lock()?;
        let mut due: Vec<_> = records
            .leads
            .values()
            .filter(|l| l.campaign_id == campaign_id && l.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|l| l.next_touch_at);
        due.truncate(limit);
        Ok(due)
    }

    fn upsert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        self.lock()?.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    fn outbox(&self, id: OutboxId) -> Result<Option<OutboxEmail>, StoreError> {
        Ok(self.lock()?.outbox.get(&id).cloned())
    }

    fn outbox_by_dedupe_key(&self, key: &str) -> Result<Option<OutboxEmail>, StoreError> {
        let records = self.lock()?;
        Ok(records
            .outbox_by_key
            .get(key)
            .and_then(|id| records.outbox.get(id))
            .cloned())
    }

    fn insert_outbox(&self, record: OutboxEmail) -> Result<OutboxId, StoreError> {
        let mut records = self.lock()?;
        if records.outbox_by_key.contains_key(&record.dedupe_key) {
            return Err(StoreError::DuplicateKey(record.dedupe_key));
        }
        let id = record.id;
        records.outbox_by_key.insert(record.dedupe_key.clone(), id);
        records.outbox.insert(id, record);
        Ok(id)
    }

    fn update_outbox(&self, record: &OutboxEmail) -> Result<(), StoreError> {
        let mut records = self.lock()?;
        if !records.outbox.contains_key(&record.id) {
            return Err(StoreError::NotFound);
        }
        records.outbox.insert(record.id, record.clone());
        Ok(())
    }
}
