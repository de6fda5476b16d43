//! Cross-cutting runtime primitives
//!
//! Deterministic helpers shared by every other component: atomic writes
//! with optimistic concurrency, content hashing, secret scanning, and
//! path/task-id canonicalization.

pub mod atomic;
pub mod hash;
pub mod paths;
pub mod secrets;

pub use atomic::{atomic_write, read_version_token};
pub use hash::{hash_content, hash_text, normalize_text};
pub use paths::{normalize_path, resolve_task_id};
pub use secrets::{RedactionEngine, SecretMatch};
