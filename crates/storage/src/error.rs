use {termvault_vault::VaultError, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("storage I/O error: {0}")]
    StorageIo(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("host storage error: {message}")]
    Host { message: String },

    #[error("corrupted data: {message}")]
    Corrupted { message: String },
}

/// The caller-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PasswordRequired,
    InvalidPassword,
    CorruptedData,
    UnsupportedEnvironment,
    StorageIo,
}

impl Error {
    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Map this error onto the category a UI reacts to.
    ///
    /// `InvalidPassword` re-prompts; `PasswordRequired` asks to unlock; the rest
    /// are reported.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Vault(VaultError::PasswordRequired) => ErrorKind::PasswordRequired,
            Self::Vault(VaultError::InvalidPassword) => ErrorKind::InvalidPassword,
            Self::Vault(VaultError::UnsupportedEnvironment(_)) => ErrorKind::UnsupportedEnvironment,
            Self::Vault(
                VaultError::CorruptedData(_)
                | VaultError::CipherError(_)
                | VaultError::Base64(_)
                | VaultError::Json(_),
            )
            | Self::Json(_)
            | Self::Corrupted { .. } => ErrorKind::CorruptedData,
            Self::StorageIo(_)
            | Self::Io(_)
            | Self::Migrate(_)
            | Self::Join(_)
            | Self::Host { .. } => ErrorKind::StorageIo,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
