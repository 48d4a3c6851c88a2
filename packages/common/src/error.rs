use thiserror::Error;

/// Error type shared by every mindtree crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommonError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}
