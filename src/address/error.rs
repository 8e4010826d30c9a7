use thiserror::Error;

/// Syntax failures detected before any network I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address has no '@'")]
    MissingAt,
    #[error("local part is empty")]
    EmptyLocal,
    #[error("local part contains {found:?}, which cannot be sent in a command")]
    InvalidLocal { found: char },
    #[error("domain '{domain}' is not a valid mail domain")]
    InvalidDomain { domain: String },
}

impl AddressError {
    pub(crate) fn invalid_domain(domain: impl Into<String>) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
        }
    }

    /// Short machine-friendly tag used in verdict details.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAt => "invalid_format",
            Self::EmptyLocal | Self::InvalidLocal { .. } | Self::InvalidDomain { .. } => "invalid_syntax",
        }
    }
}
