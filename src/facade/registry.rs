//! Operation registry
//!
//! Every facade operation is declared once, here, and checked at
//! startup against the published list. Handlers look up their canonical
//! stage name through the registry, so ledger records and log spans
//! cannot drift from the operation they belong to.

use crate::error::{TalosError, TalosResult};
use std::collections::BTreeMap;

/// The published operation surface
pub const PUBLISHED_OPERATIONS: &[&str] = &[
    "init_context",
    "get_context",
    "list_bundles",
    "attach_evidence",
    "verify_evidence",
    "run_validation",
    "verify_drift",
    "migrate",
    "release_quarantine",
];

/// Validated name -> description map of registered operations
pub struct OperationRegistry {
    handlers: BTreeMap<&'static str, &'static str>,
}

impl OperationRegistry {
    /// Build and validate the standard registry
    pub fn standard() -> TalosResult<Self> {
        let mut registry = Self {
            handlers: BTreeMap::new(),
        };

        registry.register("init_context", "create the immutable bundle for a unit of work")?;
        registry.register("get_context", "load a bundle, refusing quarantined ones")?;
        registry.register("list_bundles", "enumerate stored task ids")?;
        registry.register("attach_evidence", "attach typed evidence to a bundle")?;
        registry.register("verify_evidence", "re-hash a stored artifact against its record")?;
        registry.register("run_validation", "execute declared validation commands")?;
        registry.register("verify_drift", "compare the live tree against the snapshot")?;
        registry.register("migrate", "persist a bundle at the current schema")?;
        registry.register("release_quarantine", "release a quarantined bundle")?;

        registry.validate()?;
        Ok(registry)
    }

    fn register(&mut self, name: &'static str, description: &'static str) -> TalosResult<()> {
        if self.handlers.insert(name, description).is_some() {
            return Err(TalosError::Internal(format!(
                "operation registered twice: {name}"
            )));
        }
        Ok(())
    }

    /// Every registered operation must be published, and vice versa
    fn validate(&self) -> TalosResult<()> {
        for name in self.handlers.keys() {
            if !PUBLISHED_OPERATIONS.contains(name) {
                return Err(TalosError::Internal(format!(
                    "operation not in the published list: {name}"
                )));
            }
        }
        for name in PUBLISHED_OPERATIONS {
            if !self.handlers.contains_key(name) {
                return Err(TalosError::Internal(format!(
                    "published operation has no handler: {name}"
                )));
            }
        }
        Ok(())
    }

    /// Canonical stage name for ledger records and spans
    pub fn stage(&self, name: &str) -> &'static str {
        self.handlers
            .get_key_value(name)
            .map(|(k, _)| *k)
            .unwrap_or("unknown")
    }

    /// Registered operations with their descriptions, sorted by name
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.handlers.iter().map(|(k, v)| (*k, *v))
    }
}
