//! Wire payloads for the four campaign job types.
//!
//! Payloads carry ids, never snapshots: every handler re-reads current state
//! from the record store, so a stale job can only act on fresh data.

use serde::{Deserialize, Serialize};

use drip_core::{CampaignId, LeadId, OutboxId};

/// `tick` carries no data; the sweep reads everything from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickPayload {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateCopyPayload {
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailPayload {
    pub outbox_id: OutboxId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRepliesPayload {
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
}
