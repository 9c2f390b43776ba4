//! Ownership-aware reconciliation of encrypted secret declarations.
//!
//! [`ReconciliationEngine`] combines a [`CryptoService`] (transit encrypt and
//! decrypt under one key) with a [`ManagedStore`] (KV access guarded by the
//! `managed_by` tag) and exposes the [`SecretLifecycle`] operations.

pub mod crypto;
pub mod engine;
pub mod memory;
pub mod retry;
pub mod store;

pub use crypto::CryptoService;
pub use engine::{Reconciliation, ReconciliationEngine};
pub use memory::{MemoryKv, MemoryTransit};
pub use retry::{RetryPolicy, Retrying};
pub use store::ManagedStore;
pub use vaultsync_spec::SecretLifecycle;

/// Engine wired to the in-process backends.
pub type MemoryEngine = ReconciliationEngine<CryptoService<MemoryTransit>, MemoryKv>;

impl MemoryEngine {
    /// Build an engine over fresh in-memory backends.
    pub fn in_memory(managed_by: impl Into<String>) -> Self {
        ReconciliationEngine::new(
            CryptoService::new(MemoryTransit::new(), "transit", "vaultsync"),
            ManagedStore::new(MemoryKv::new(), "secret", managed_by),
        )
    }
}
