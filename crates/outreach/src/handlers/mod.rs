//! The four campaign job handlers.
//!
//! Each handler is one idempotent link in the chain
//! `tick → generate_copy → send_email → poll_replies`. They share a shape:
//! decode the payload, re-read state from the record store, no-op when the
//! world moved on, otherwise do the one thing the job exists for and enqueue
//! the next link.

mod generate_copy;
mod poll_replies;
mod send_email;
mod tick;

pub use generate_copy::GenerateCopyHandler;
pub use poll_replies::PollRepliesHandler;
pub use send_email::SendEmailHandler;
pub use tick::TickHandler;
