//! # Event subscribers for the engine.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! EngineActor ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//!                                                                      │
//!                                                      ┌───────────────┼──────────┐
//!                                                      ▼               ▼          ▼
//!                                                  LogWriter        Metrics     Custom
//! ```

mod embedded;
mod subscribe;
mod subscriber_set;

pub use embedded::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
