//! Engine core: the loop, its records and the public facade.
//!
//! The public API from this module is [`Engine`] (with [`EngineBuilder`] and
//! [`EngineConfig`]), the [`Resolver`]/[`Output`] pair handed to start and output
//! routines, and the diagnostic [`Report`].
//!
//! Internal modules:
//! - [`actor`]: the single-threaded engine loop and its state machine;
//! - [`registry`]: manifold records, dependents and resolver construction;
//! - [`runner`]: start attempts, exit watchers and restart timers;
//! - [`resolver`]: point-in-time typed resource lookup;
//! - [`report`]: diagnostic snapshot types;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod actor;
mod builder;
mod config;
mod engine;
mod registry;
mod report;
mod resolver;
mod runner;
mod shutdown;

pub use builder::EngineBuilder;
pub use config::{EngineConfig, IsFatal};
pub use engine::Engine;
pub use report::{ManifoldReport, ManifoldState, Report};
pub use resolver::{Output, Resolver};
