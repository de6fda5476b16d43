//! Provider layer: the only boundary for external processes
//!
//! Every version-control query and shell command the engine performs
//! goes through `ProcessProvider` or `VersionControlProvider`. No other
//! module spawns a process. Calls are wrapped with bounded retries,
//! telemetry spans, and redaction of recorded output.

pub mod process;
pub mod retry;
pub mod vcs;

pub use process::{ProcessProvider, ProcessResult, ProcessSpec};
pub use retry::BackoffPolicy;
pub use vcs::{GitProvider, StatusEntry, VersionControlProvider};
