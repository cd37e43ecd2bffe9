//! `drip-outreach` — the campaign handler chain.
//!
//! Jobs flow `tick → generate_copy → send_email → poll_replies`; each link
//! is a [`drip_queue::JobHandler`] that re-reads state from the
//! [`drip_domain::RecordStore`], performs one idempotent step, and enqueues
//! the next. External side effects (delivery, inbox access, copy
//! generation) sit behind the capability traits in [`providers`] and
//! [`copywriter`].

use std::sync::Arc;
use std::time::Duration;

use drip_domain::RecordStore;
use drip_events::EventSink;
use drip_queue::{HandlerRegistry, JobStore};

pub mod copywriter;
pub mod handlers;
pub mod payload;
pub mod providers;

pub use copywriter::{CopyWriter, EmailDraft, LlmCopyWriter, TemplateCopyWriter};
pub use handlers::{GenerateCopyHandler, PollRepliesHandler, SendEmailHandler, TickHandler};
pub use payload::{GenerateCopyPayload, PollRepliesPayload, SendEmailPayload, TickPayload};
pub use providers::{
    GeneratorError, MailError, MailProvider, MailReceipt, NoReplyClassifier, ReplyCheck,
    ReplyClassifier, ReplySentiment, StructuredGenerator,
};

/// Tunables for the campaign chain.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// Max due leads swept per campaign per tick. A backlog beyond this
    /// drains across subsequent ticks.
    pub lead_batch_size: usize,
    /// Delay before the sweep re-arms itself.
    pub tick_interval: Duration,
    /// Delay between sending an email and first polling its thread.
    pub reply_poll_delay: Duration,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            lead_batch_size: 25,
            tick_interval: Duration::from_secs(15),
            reply_poll_delay: Duration::from_secs(30),
        }
    }
}

/// Assembles the full four-handler registry over one set of collaborators.
pub fn standard_registry(
    records: Arc<dyn RecordStore>,
    jobs: Arc<dyn JobStore>,
    sink: Arc<dyn EventSink>,
    mailer: Arc<dyn MailProvider>,
    classifier: Arc<dyn ReplyClassifier>,
    writer: Arc<dyn CopyWriter>,
    config: OutreachConfig,
) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(Box::new(TickHandler::new(
            records.clone(),
            jobs.clone(),
            config.clone(),
        )))
        .with(Box::new(GenerateCopyHandler::new(
            records.clone(),
            jobs.clone(),
            sink.clone(),
            writer,
        )))
        .with(Box::new(SendEmailHandler::new(
            records.clone(),
            jobs,
            sink.clone(),
            mailer,
            config,
        )))
        .with(Box::new(PollRepliesHandler::new(records, sink, classifier)))
}
