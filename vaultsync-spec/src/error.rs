use thiserror::Error;

/// Result alias for vaultsync operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Canonical error surface shared by the capability seams and the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The remote entry exists but is untagged or tagged for another identity.
    #[error("{key:?} is not managed by this configuration{}", owner_suffix(.owner))]
    NotManaged { key: String, owner: Option<String> },
    #[error("{entity} not found")]
    NotFound { entity: String },
    /// The crypto service answered without the field we asked for.
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("value of {key:?} is {found}, expected a string")]
    UnexpectedValueType { key: String, found: &'static str },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid {0}: {1}")]
    Invalid(String, String),
    /// Attaches the secret key a multi-key loop was processing when it failed.
    #[error("secret {key:?}: {source}")]
    Secret {
        key: String,
        #[source]
        source: Box<Error>,
    },
}

fn owner_suffix(owner: &Option<String>) -> String {
    match owner {
        Some(owner) => format!(" (managed_by: {owner:?})"),
        None => String::new(),
    }
}

impl Error {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Wrap `self` with the key being processed.
    pub fn for_key(self, key: impl Into<String>) -> Self {
        Self::Secret {
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with any key context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Self::Secret { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    pub fn is_not_managed(&self) -> bool {
        matches!(self.root(), Self::NotManaged { .. })
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Self::Transport(_))
    }
}
