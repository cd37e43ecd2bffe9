use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drip_core::{CampaignId, LeadId, OutboxId};

/// Outbox record status: planned vs delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Queued,
    Sent,
}

/// Deterministic idempotency key for one (campaign, lead, step) email.
///
/// `generate_copy` may run any number of times for the same payload; every
/// run computes the same key, so at most one outbox record can ever exist for
/// a given touch.
pub fn dedupe_key(campaign_id: CampaignId, lead_id: LeadId, step_index: usize) -> String {
    format!("c{campaign_id}:l{lead_id}:s{step_index}")
}

/// One planned or sent email — the unit `send_email` operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEmail {
    pub id: OutboxId,
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub step_index: usize,
    pub dedupe_key: String,
    pub subject: String,
    pub body: String,
    pub status: OutboxStatus,
    pub provider_message_id: Option<String>,
    pub thread_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEmail {
    pub fn queued(
        campaign_id: CampaignId,
        lead_id: LeadId,
        step_index: usize,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: OutboxId::new(),
            campaign_id,
            lead_id,
            step_index,
            dedupe_key: dedupe_key(campaign_id, lead_id, step_index),
            subject: subject.into(),
            body: body.into(),
            status: OutboxStatus::Queued,
            provider_message_id: None,
            thread_id: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == OutboxStatus::Sent
    }

    /// Record a successful provider delivery.
    pub fn mark_sent(
        &mut self,
        provider_message_id: impl Into<String>,
        thread_id: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.status = OutboxStatus::Sent;
        self.provider_message_id = Some(provider_message_id.into());
        self.thread_id = Some(thread_id.into());
        self.sent_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_is_deterministic() {
        let campaign = CampaignId::new();
        let lead = LeadId::new();

        assert_eq!(dedupe_key(campaign, lead, 2), dedupe_key(campaign, lead, 2));
        assert_ne!(dedupe_key(campaign, lead, 2), dedupe_key(campaign, lead, 3));
    }

    #[test]
    fn queued_record_carries_its_key() {
        let campaign = CampaignId::new();
        let lead = LeadId::new();
        let record = OutboxEmail::queued(campaign, lead, 0, "hi", "hello");

        assert_eq!(record.dedupe_key, dedupe_key(campaign, lead, 0));
        assert!(!record.is_sent());
        assert!(record.sent_at.is_none());
    }

    #[test]
    fn mark_sent_records_provider_ids() {
        let mut record =
            OutboxEmail::queued(CampaignId::new(), LeadId::new(), 0, "hi", "hello");
        let now = Utc::now();

        record.mark_sent("msg-1", "thread-1", now);

        assert!(record.is_sent());
        assert_eq!(record.provider_message_id.as_deref(), Some("msg-1"));
        assert_eq!(record.thread_id.as_deref(), Some("thread-1"));
        assert_eq!(record.sent_at, Some(now));
    }
}
