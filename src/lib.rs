//! Talos - task context caching and integrity engine
//!
//! Caches an immutable snapshot of everything a unit of work needs
//! (requirements, plan, standards excerpts), enriches it with typed
//! evidence and QA results, and detects drift between the snapshot and
//! the live source tree. Every external process call goes through the
//! provider layer.

pub mod cli;
pub mod config;
pub mod drift;
pub mod error;
pub mod evidence;
pub mod facade;
pub mod ledger;
pub mod model;
pub mod provider;
pub mod qa;
pub mod runtime;
pub mod snapshot;
pub mod store;

pub use error::{TalosError, TalosResult};
pub use facade::CacheFacade;
