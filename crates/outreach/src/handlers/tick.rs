//! The recurring campaign sweep.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};

use drip_domain::RecordStore;
use drip_queue::{HandlerError, JobHandler, JobStore, JobType, NewJob};

use crate::OutreachConfig;
use crate::payload::{GenerateCopyPayload, TickPayload};

/// Sweeps every running campaign for due leads and enqueues one
/// `generate_copy` job per (campaign, lead) pair found.
///
/// A successful sweep re-enqueues itself before returning, even when it
/// found nothing to do, so a single seeded `tick` job keeps the engine
/// alive indefinitely. A failed sweep does not re-arm: the retry of the
/// failed job is the sole continuation of the chain, keeping exactly one
/// tick pending at a time. Duplicate `generate_copy` jobs for the same
/// lead are harmless: the outbox dedupe key collapses them downstream.
pub struct TickHandler {
    records: Arc<dyn RecordStore>,
    jobs: Arc<dyn JobStore>,
    config: OutreachConfig,
}

impl TickHandler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        jobs: Arc<dyn JobStore>,
        config: OutreachConfig,
    ) -> Self {
        Self {
            records,
            jobs,
            config,
        }
    }

    fn sweep(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        for campaign in self.records.running_campaigns()? {
            let due = self
                .records
                .due_leads(campaign.id, now, self.config.lead_batch_size)?;
            for lead in due {
                let payload = GenerateCopyPayload {
                    campaign_id: campaign.id,
                    lead_id: lead.id,
                };
                self.jobs.enqueue(NewJob::new(
                    JobType::GenerateCopy,
                    serde_json::to_value(payload)?,
                ))?;
            }
        }
        Ok(())
    }

    fn rearm(&self) -> anyhow::Result<()> {
        self.jobs.enqueue(
            NewJob::new(JobType::Tick, json!({})).delayed(self.config.tick_interval),
        )?;
        Ok(())
    }
}

impl JobHandler for TickHandler {
    fn job_type(&self) -> JobType {
        JobType::Tick
    }

    fn execute(&self, payload: &Value) -> Result<(), HandlerError> {
        let _: TickPayload =
            serde_json::from_value(payload.clone()).map_err(HandlerError::invalid_payload)?;
        self.sweep().map_err(HandlerError::from)?;
        self.rearm().map_err(HandlerError::from)
    }
}
