//! `drip-domain` — campaign, lead, and outbox records.
//!
//! The handler chain reads and writes these through the [`RecordStore`]
//! trait; this crate owns the record shapes and the lead state machine, not
//! persistence (migrations and durable backends live with the embedding
//! application).

pub mod campaign;
pub mod lead;
pub mod outbox;
pub mod store;

pub use campaign::{Campaign, CampaignStatus, SequenceStep};
pub use lead::{Lead, LeadState};
pub use outbox::{OutboxEmail, OutboxStatus, dedupe_key};
pub use store::{InMemoryRecordStore, RecordStore, StoreError};
