//! Checking a conversation thread for replies.

use std::sync::Arc;

use serde_json::{Value, json};

use drip_domain::RecordStore;
use drip_events::{EventSink, OpsEvent};
use drip_queue::{HandlerError, JobHandler, JobType};

use crate::payload::PollRepliesPayload;
use crate::providers::{ReplyCheck, ReplyClassifier};

/// Asks the classifier whether the lead's conversation thread has new
/// inbound mail and records what it found.
///
/// Detection only: acting on a reply (stopping the lead, scheduling the
/// follow-up) is driven by the embedding application off the
/// `reply.detected` event, so polling stays safe to rerun any number of
/// times.
pub struct PollRepliesHandler {
    records: Arc<dyn RecordStore>,
    sink: Arc<dyn EventSink>,
    classifier: Arc<dyn ReplyClassifier>,
}

impl PollRepliesHandler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        sink: Arc<dyn EventSink>,
        classifier: Arc<dyn ReplyClassifier>,
    ) -> Self {
        Self {
            records,
            sink,
            classifier,
        }
    }

    fn run(&self, payload: PollRepliesPayload) -> anyhow::Result<()> {
        let Some(lead) = self.records.lead(payload.lead_id)? else {
            return Ok(());
        };
        let Some(thread_id) = lead.conversation_id.as_deref() else {
            // Send never completed for this lead; nothing to poll.
            return Ok(());
        };

        match self.classifier.check(thread_id)? {
            ReplyCheck::NoNewMessages => {
                self.sink.record(OpsEvent::info("replies.polled").with_data(json!({
                    "campaign_id": payload.campaign_id,
                    "lead_id": lead.id,
                    "thread_id": thread_id,
                })));
            }
            ReplyCheck::Reply { sentiment, text } => {
                self.sink.record(
                    OpsEvent::info("reply.detected")
                        .with_message(text)
                        .with_data(json!({
                            "campaign_id": payload.campaign_id,
                            "lead_id": lead.id,
                            "thread_id": thread_id,
                            "sentiment": sentiment,
                        })),
                );
            }
        }
        Ok(())
    }
}

impl JobHandler for PollRepliesHandler {
    fn job_type(&self) -> JobType {
        JobType::PollReplies
    }

    fn execute(&self, payload: &Value) -> Result<(), HandlerError> {
        let payload: PollRepliesPayload =
            serde_json::from_value(payload.clone()).map_err(HandlerError::invalid_payload)?;
        self.run(payload).map_err(HandlerError::from)
    }
}
