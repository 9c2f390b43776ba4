pub mod error;
pub mod kv;
pub mod lifecycle;
pub mod ownership;
pub mod record;
pub mod transit;
pub mod value;

pub use error::{Error, Result};
pub use kv::{KvApi, KvMetadata};
pub use lifecycle::SecretLifecycle;
pub use ownership::{DenyReason, MANAGED_BY_KEY, OwnershipDecision};
pub use record::{CiphertextMap, PlaintextMap, SecretRecord, requires_replacement};
pub use transit::{Cipher, TransitApi};
pub use value::{coerce_plaintext, value_kind};
