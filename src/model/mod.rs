//! Versioned data model
//!
//! Every persisted entity lives in `bundle`, and its canonical JSON
//! serialization contract (schema version, envelope, migrations) in
//! `schema`.

pub mod bundle;
pub mod schema;

pub use bundle::{
    ArtifactKind, DriftReport, DriftStatus, EvidenceArtifact, ExceptionRecord, ImmutableSnapshot,
    QaResult, QaStatus, QuarantineEntry, RetryPolicy, StandardsExcerpt, TaskContextBundle,
    ValidationCommand, WorkDescriptor,
};
pub use schema::{deserialize_bundle, serialize_bundle, MigrationRegistry, SCHEMA_VERSION};
