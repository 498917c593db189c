//! # rg-journal
//!
//! Durable at-least-once journal of quotes and trades. Events are appended
//! to per-hour files by a dedicated writer thread and replayed through the
//! engine on startup so rule state survives a restart. Files older than
//! the retention horizon are deleted.

pub mod codec;
pub mod journal;

pub use journal::{Journal, JournalSettings};
