//! Entity identity.
//!
//! Every node, edge and card is addressed by an [`Identifier`]. Entities the
//! remote store has confirmed carry a [`Identifier::Real`] id; entities that
//! only exist locally carry a [`Identifier::Pending`] id until the commit that
//! creates them promotes it.

use crate::error::CommonError;
use crate::result::CommonResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every locally minted identifier on the wire.
pub const TEMP_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Identifier {
    /// Assigned by the remote store
    Real(String),
    /// Minted locally, not yet known to the remote store
    Pending(String),
}

impl Identifier {
    pub fn real(id: impl Into<String>) -> Self {
        Identifier::Real(id.into())
    }

    pub fn pending(id: impl Into<String>) -> Self {
        Identifier::Pending(id.into())
    }

    /// Parse a wire-format id. Only here is the `temp-` prefix meaningful.
    pub fn parse(raw: &str) -> CommonResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CommonError::InvalidIdentifier(raw.to_string()));
        }
        if raw.starts_with(TEMP_PREFIX) {
            Ok(Identifier::Pending(raw.to_string()))
        } else {
            Ok(Identifier::Real(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Real(id) | Identifier::Pending(id) => id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Identifier::Pending(_))
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Identifier::Real(_))
    }

    /// The remote id, if the remote store knows this entity
    pub fn real_id(&self) -> Option<&str> {
        match self {
            Identifier::Real(id) => Some(id),
            Identifier::Pending(_) => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        match id {
            Identifier::Real(id) | Identifier::Pending(id) => id,
        }
    }
}

impl TryFrom<String> for Identifier {
    type Error = CommonError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Identifier::parse(&raw)
    }
}
