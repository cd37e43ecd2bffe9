//! Capability traits for the external collaborators the handlers talk to.
//!
//! Delivery, reply classification and copy generation are all side effects
//! the queue cannot make transactional; each is behind a trait so tests and
//! embedders can substitute fakes.

use serde_json::Value;

/// What the mail provider handed back for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailReceipt {
    /// Provider-assigned message id.
    pub provider_message_id: String,
    /// Conversation thread the message belongs to; reply polling keys off it.
    pub thread_id: String,
}

/// Delivery failure, split by whether retrying can help.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MailError {
    /// Rate limit, timeout, 5xx. Worth retrying with backoff.
    #[error("transient mail failure: {0}")]
    Transient(String),
    /// Rejected address, auth failure. Retrying reproduces the rejection,
    /// but the retry budget bounds how long we keep trying.
    #[error("permanent mail failure: {0}")]
    Permanent(String),
}

/// Outbound email delivery.
pub trait MailProvider: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<MailReceipt, MailError>;
}

/// Classified sentiment of an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySentiment {
    Positive,
    Negative,
    Neutral,
}

/// Result of checking a conversation thread for new inbound mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyCheck {
    NoNewMessages,
    Reply {
        sentiment: ReplySentiment,
        text: String,
    },
}

/// Inbox access plus reply classification for one conversation thread.
pub trait ReplyClassifier: Send + Sync {
    fn check(&self, thread_id: &str) -> anyhow::Result<ReplyCheck>;
}

/// Classifier that never sees a reply. The default until an inbox
/// integration is wired in; `poll_replies` stays a safe no-op with it.
#[derive(Debug, Default)]
pub struct NoReplyClassifier;

impl ReplyClassifier for NoReplyClassifier {
    fn check(&self, _thread_id: &str) -> anyhow::Result<ReplyCheck> {
        Ok(ReplyCheck::NoNewMessages)
    }
}

/// LLM failure while generating structured output.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("model returned malformed JSON: {0}")]
    Malformed(String),
}

/// Text model constrained to JSON output, used for email drafting.
pub trait StructuredGenerator: Send + Sync {
    fn generate_json(&self, prompt: &str) -> Result<Value, GeneratorError>;
}
