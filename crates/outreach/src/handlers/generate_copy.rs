//! Drafting the next touch for one lead.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Value, json};

use drip_domain::{OutboxEmail, RecordStore, StoreError, dedupe_key};
use drip_core::OutboxId;
use drip_events::{EventSink, OpsEvent};
use drip_queue::{HandlerError, JobHandler, JobStore, JobType, NewJob};

use crate::copywriter::CopyWriter;
use crate::payload::{GenerateCopyPayload, SendEmailPayload};

/// Drafts the lead's next email, records it in the outbox and enqueues
/// `send_email` for it.
///
/// Idempotency hinges on the outbox dedupe key: every run for the same
/// (campaign, lead, step) computes the same key, so a rerun finds the
/// existing record and skips straight to re-enqueueing `send_email` — the
/// recovery path for a crash between outbox insert and enqueue.
pub struct GenerateCopyHandler {
    records: Arc<dyn RecordStore>,
    jobs: Arc<dyn JobStore>,
    sink: Arc<dyn EventSink>,
    writer: Arc<dyn CopyWriter>,
}

impl GenerateCopyHandler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        jobs: Arc<dyn JobStore>,
        sink: Arc<dyn EventSink>,
        writer: Arc<dyn CopyWriter>,
    ) -> Self {
        Self {
            records,
            jobs,
            sink,
            writer,
        }
    }

    fn enqueue_send(&self, outbox_id: OutboxId) -> anyhow::Result<()> {
        self.jobs.enqueue(NewJob::new(
            JobType::SendEmail,
            serde_json::to_value(SendEmailPayload { outbox_id })?,
        ))?;
        Ok(())
    }

    fn run(&self, payload: GenerateCopyPayload) -> anyhow::Result<()> {
        // Missing or stopped records mean the world moved on since the sweep;
        // the job's work no longer exists, which is success.
        let Some(campaign) = self.records.campaign(payload.campaign_id)? else {
            return Ok(());
        };
        let Some(lead) = self.records.lead(payload.lead_id)? else {
            return Ok(());
        };
        if !lead.state.is_contactable() {
            return Ok(());
        }

        // A sequence may appear later (campaign still being edited), so this
        // is a retryable failure rather than a permanent one.
        let Some((step_index, step)) = campaign.step_for_touch(lead.touch_count) else {
            anyhow::bail!("campaign {} has no sequence steps saved", campaign.id);
        };

        let key = dedupe_key(campaign.id, lead.id, step_index);
        if let Some(existing) = self.records.outbox_by_dedupe_key(&key)? {
            self.enqueue_send(existing.id)?;
            return Ok(());
        }

        let draft = self.writer.draft(&campaign, &lead, step)?;
        let record = OutboxEmail::queued(campaign.id, lead.id, step_index, draft.subject, draft.body);
        let outbox_id = match self.records.insert_outbox(record) {
            Ok(id) => id,
            // Lost the insert race against a concurrent duplicate run; its
            // record serves just as well.
            Err(StoreError::DuplicateKey(_)) => self
                .records
                .outbox_by_dedupe_key(&key)?
                .map(|record| record.id)
                .context("outbox record vanished after duplicate key")?,
            Err(err) => return Err(err.into()),
        };

        self.sink.record(
            OpsEvent::info("outbox.created")
                .with_message(format!("drafted step {step_index} for {}", lead.email))
                .with_data(json!({
                    "campaign_id": campaign.id,
                    "lead_id": lead.id,
                    "outbox_id": outbox_id,
                    "step_index": step_index,
                })),
        );

        self.enqueue_send(outbox_id)
    }
}

impl JobHandler for GenerateCopyHandler {
    fn job_type(&self) -> JobType {
        JobType::GenerateCopy
    }

    fn execute(&self, payload: &Value) -> Result<(), HandlerError> {
        let payload: GenerateCopyPayload =
            serde_json::from_value(payload.clone()).map_err(HandlerError::invalid_payload)?;
        self.run(payload).map_err(HandlerError::from)
    }
}
