//! `drip-core` — shared foundation for the campaign engine.
//!
//! This crate contains **pure** primitives (identifiers, error model) with no
//! infrastructure concerns. Everything else depends on it; it depends on
//! nothing in the workspace.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CampaignId, JobId, LeadId, OutboxId, WorkspaceId};
