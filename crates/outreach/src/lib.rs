//! Outreach campaign delivery engine.
//!
//! The crate turns enrolled leads and multi-step campaigns into due email
//! jobs, dispatches those jobs through a transactional email provider, and
//! folds provider-reported delivery events back into enrollment state via an
//! append-only outbox. The HTTP surface (cron trigger, provider webhook, and
//! step batch editor) is exposed as an [`axum`] router so the service crate
//! only adds operational endpoints around it.

pub mod campaigns;
pub mod config;
pub mod error;
pub mod telemetry;
