use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Table,
    Page,
    Global,
}

impl ScopeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeType::Table => "table",
            ScopeType::Page => "page",
            ScopeType::Global => "global",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(ScopeType::Table),
            "page" => Ok(ScopeType::Page),
            "global" => Ok(ScopeType::Global),
            other => Err(ScopeParseError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeParseError {
    #[error("unknown scope type {0:?}")]
    UnknownType(String),
    #[error("scope key {0:?} is not of the form type:id")]
    Malformed(String),
}

/// Addresses one bucket of persisted UI state.
///
/// Identity always combines type and id: `table:orders` and `page:orders` are
/// unrelated scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    scope_type: ScopeType,
    scope_id: String,
}

impl ScopeKey {
    pub fn new(scope_type: ScopeType, scope_id: impl Into<String>) -> Self {
        Self {
            scope_type,
            scope_id: scope_id.into(),
        }
    }

    pub fn table(scope_id: impl Into<String>) -> Self {
        Self::new(ScopeType::Table, scope_id)
    }

    pub fn page(scope_id: impl Into<String>) -> Self {
        Self::new(ScopeType::Page, scope_id)
    }

    pub fn global(scope_id: impl Into<String>) -> Self {
        Self::new(ScopeType::Global, scope_id)
    }

    pub fn scope_type(&self) -> ScopeType {
        self.scope_type
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    /// Key under which the scope's current state lives in durable storage.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.scope_type, self.scope_id)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope_type, self.scope_id)
    }
}

impl FromStr for ScopeKey {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ScopeParseError::Malformed(s.to_string()))?;
        if id.is_empty() {
            return Err(ScopeParseError::Malformed(s.to_string()));
        }
        Ok(Self::new(kind.parse()?, id))
    }
}
