//! Delivering one outbox record.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};

use drip_domain::RecordStore;
use drip_events::{EventSink, OpsEvent};
use drip_queue::{HandlerError, JobHandler, JobStore, JobType, NewJob};

use crate::OutreachConfig;
use crate::payload::{PollRepliesPayload, SendEmailPayload};

/// Delivers a queued outbox record through the mail provider, advances the
/// lead to `WAITING_REPLY`, and schedules `poll_replies` for the new thread.
///
/// The sent-check up front makes redelivery safe: once the record is marked
/// sent, every further run of the same payload is a no-op. A crash inside
/// the provider call can still double-send — that window is why the queue
/// promises at-least-once, not exactly-once.
pub struct SendEmailHandler {
    records: Arc<dyn RecordStore>,
    jobs: Arc<dyn JobStore>,
    sink: Arc<dyn EventSink>,
    mailer: Arc<dyn crate::providers::MailProvider>,
    config: OutreachConfig,
}

impl SendEmailHandler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        jobs: Arc<dyn JobStore>,
        sink: Arc<dyn EventSink>,
        mailer: Arc<dyn crate::providers::MailProvider>,
        config: OutreachConfig,
    ) -> Self {
        Self {
            records,
            jobs,
            sink,
            mailer,
            config,
        }
    }

    fn run(&self, payload: SendEmailPayload) -> anyhow::Result<()> {
        let Some(mut record) = self.records.outbox(payload.outbox_id)? else {
            return Ok(());
        };
        if record.is_sent() {
            return Ok(());
        }
        let Some(mut lead) = self.records.lead(record.lead_id)? else {
            return Ok(());
        };
        let Some(campaign) = self.records.campaign(record.campaign_id)? else {
            return Ok(());
        };

        let receipt = self.mailer.send(&lead.email, &record.subject, &record.body)?;

        let now = Utc::now();
        record.mark_sent(&receipt.provider_message_id, &receipt.thread_id, now);
        self.records.update_outbox(&record)?;

        // A concurrent duplicate run may have advanced the lead between our
        // read and here; the touch is then already recorded.
        if lead.state.is_contactable() {
            lead.record_touch(&receipt.thread_id, campaign.cadence_days, now)?;
            self.records.upsert_lead(&lead)?;
        }

        self.sink.record(
            OpsEvent::info("email.sent")
                .with_data(json!({
                    "campaign_id": campaign.id,
                    "lead_id": lead.id,
                    "outbox_id": record.id,
                    "step_index": record.step_index,
                    "thread_id": receipt.thread_id,
                })),
        );
        self.sink.record(
            OpsEvent::info("activity.email_sent")
                .with_message(format!("Sent: {}", record.subject))
                .with_data(json!({ "lead_id": lead.id })),
        );

        self.jobs.enqueue(
            NewJob::new(
                JobType::PollReplies,
                serde_json::to_value(PollRepliesPayload {
                    campaign_id: campaign.id,
                    lead_id: lead.id,
                })?,
            )
            .delayed(self.config.reply_poll_delay),
        )?;
        Ok(())
    }
}

impl JobHandler for SendEmailHandler {
    fn job_type(&self) -> JobType {
        JobType::SendEmail
    }

    fn execute(&self, payload: &Value) -> Result<(), HandlerError> {
        let payload: SendEmailPayload =
            serde_json::from_value(payload.clone()).map_err(HandlerError::invalid_payload)?;
        self.run(payload).map_err(HandlerError::from)
    }
}
