use crate::identifier::{Identifier, TEMP_PREFIX};

/// Which entity a temporary id is minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    Node,
    Card,
    Edge,
}

impl TempKind {
    fn label(self) -> &'static str {
        match self {
            TempKind::Node => "node",
            TempKind::Card => "card",
            TempKind::Edge => "edge",
        }
    }
}

/// Sequential generator for temporary identifiers.
///
/// Ids look like `temp-node-<millis>-<n>`. The counter keeps ids minted in the
/// same millisecond distinct.
#[derive(Debug, Clone, Default)]
pub struct IdMinter {
    count: u64,
}

impl IdMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next temporary id for `kind`
    pub fn mint(&mut self, kind: TempKind) -> Identifier {
        self.count += 1;
        let ts = chrono::Utc::now().timestamp_millis();
        Identifier::Pending(format!("{TEMP_PREFIX}{}-{ts}-{}", kind.label(), self.count))
    }

    pub fn node(&mut self) -> Identifier {
        self.mint(TempKind::Node)
    }

    pub fn card(&mut self) -> Identifier {
        self.mint(TempKind::Card)
    }

    pub fn edge(&mut self) -> Identifier {
        self.mint(TempKind::Edge)
    }

    /// Number of ids minted so far
    pub fn minted(&self) -> u64 {
        self.count
    }
}
