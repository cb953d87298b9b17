//! Mutation gate: which authenticated callers may change state.
//!
//! Queries are open to any caller; every mutating engine operation checks
//! `is_allowed` before touching state. The identity set is fixed at
//! construction — there is no role transfer.

use std::collections::HashSet;

/// A mutating operation, for policy decisions and audit labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AddRoom,
    Book,
    Free,
    Lock,
    Unlock,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AddRoom => "add_room",
            Action::Book => "book",
            Action::Free => "free",
            Action::Lock => "lock",
            Action::Unlock => "unlock",
        }
    }
}

/// Holds the set of identities allowed to mutate. The default deployment
/// configures a single administrator, but the engine only sees this
/// capability interface.
#[derive(Debug)]
pub struct Authorizer {
    allowed: HashSet<String>,
}

impl Authorizer {
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn single_admin(admin: impl Into<String>) -> Self {
        Self::new([admin.into()])
    }

    /// All actions currently share one policy: caller must be in the set.
    pub fn is_allowed(&self, caller: &str, _action: Action) -> bool {
        self.allowed.contains(caller)
    }
}
