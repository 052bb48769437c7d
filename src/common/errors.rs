//! Error types for the game engine

use thiserror::Error;

/// Result type alias using our GameError
pub type Result<T> = std::result::Result<T, GameError>;

/// Main error type for game operations
#[derive(Error, Debug)]
pub enum GameError {
    /// Purchase attempted outside of an active trade period
    #[error("cannot do purchase because is not trade period")]
    NoTradePeriod,

    /// Team creation attempted outside of an open registration period
    #[error("cannot create team because is not registration period")]
    NoRegistrationPeriod,

    /// Purchase request names neither shares nor an additional info (or both)
    #[error("purchase must contain either share changes or one additional info")]
    EmptyPurchase,

    /// Raw ledger failure: a holding would become negative
    #[error("count of shares cannot be negative (company {company_id})")]
    NegativeShareCount { company_id: i64 },

    /// Purchase rejected because the requested share changes are invalid
    #[error("incorrect count of shares")]
    IncorrectShareCount,

    /// Purchase cost exceeds the available balance
    #[error("insufficient balance to complete the transaction: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    /// A money amount left the representable range
    #[error("amount out of range")]
    AmountOverflow,

    /// Random additional info purchase has no candidates left
    #[error("no additional infos")]
    NoAdditionalInfos,

    /// Statistics requested for a game without teams
    #[error("no teams for current game")]
    NoTeams,

    /// Team credentials already used in the current game
    #[error("credentials already taken in current game")]
    DuplicateCredentials,

    /// Referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A keyed update matched zero rows
    #[error("nothing updated: {0}")]
    NothingUpdated(String),

    /// Balance changed between read and write of a settlement
    #[error("balance {balance_id} was modified concurrently, retry the operation")]
    ConcurrentModification { balance_id: i64 },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error annotated with the name of the operation that produced it
    #[error("{operation}: {source}")]
    Context {
        operation: &'static str,
        #[source]
        source: Box<GameError>,
    },
}

/// Flat classification of [`GameError`], independent of context wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoTradePeriod,
    NoRegistrationPeriod,
    EmptyPurchase,
    NegativeShareCount,
    IncorrectShareCount,
    InsufficientBalance,
    AmountOverflow,
    NoAdditionalInfos,
    NoTeams,
    DuplicateCredentials,
    NotFound,
    NothingUpdated,
    ConcurrentModification,
    Database,
    Serialization,
    Configuration,
    Internal,
}

impl GameError {
    /// Wrap the error with the name of the failing operation
    pub fn context(self, operation: &'static str) -> Self {
        GameError::Context {
            operation,
            source: Box::new(self),
        }
    }

    /// Kind of the innermost error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::NoTradePeriod => ErrorKind::NoTradePeriod,
            GameError::NoRegistrationPeriod => ErrorKind::NoRegistrationPeriod,
            GameError::EmptyPurchase => ErrorKind::EmptyPurchase,
            GameError::NegativeShareCount { .. } => ErrorKind::NegativeShareCount,
            GameError::IncorrectShareCount => ErrorKind::IncorrectShareCount,
            GameError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            GameError::AmountOverflow => ErrorKind::AmountOverflow,
            GameError::NoAdditionalInfos => ErrorKind::NoAdditionalInfos,
            GameError::NoTeams => ErrorKind::NoTeams,
            GameError::DuplicateCredentials => ErrorKind::DuplicateCredentials,
            GameError::NotFound(_) => ErrorKind::NotFound,
            GameError::NothingUpdated(_) => ErrorKind::NothingUpdated,
            GameError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            GameError::Database(_) => ErrorKind::Database,
            GameError::Serialization(_) => ErrorKind::Serialization,
            GameError::Configuration(_) => ErrorKind::Configuration,
            GameError::Internal(_) => ErrorKind::Internal,
            GameError::Context { source, .. } => source.kind(),
        }
    }

    /// Whether the caller can fix the request (4xx) as opposed to an infra failure (5xx)
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Database
                | ErrorKind::Serialization
                | ErrorKind::Configuration
                | ErrorKind::Internal
                | ErrorKind::NothingUpdated
        )
    }

    /// Message safe to show to a team or admin client
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.innermost().to_string()
        } else {
            "internal server error".to_string()
        }
    }

    fn innermost(&self) -> &GameError {
        match self {
            GameError::Context { source, .. } => source.innermost(),
            other => other,
        }
    }
}

/// Attach operation names to errors the way `?` chains propagate them
pub trait ResultExt<T> {
    fn context(self, operation: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| e.context(operation))
    }
}
