//! Operation kinds
//!
//! Which of the six lifecycle operations a request runs is decided by the
//! caller (route metadata) and passed in as an [`OperationKind`].

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    List,
    FetchOne,
    Create,
    Update,
    Delete,
    FetchRelation,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::List,
        OperationKind::FetchOne,
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::FetchRelation,
    ];

    /// Name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::FetchOne => "fetch-one",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::FetchRelation => "fetch-relation",
        }
    }

    /// Prefix of the operation's log events
    pub fn event_prefix(&self) -> &'static str {
        match self {
            Self::List => "LIST",
            Self::FetchOne => "FETCH_ONE",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::FetchRelation => "FETCH_RELATION",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
