//! Per-operation scope requirements.
//!
//! The RPC layer declares which scopes each tool needs in an
//! [`OperationRegistry`]; the gate checks a verified token against it
//! before a `tools/call` reaches the tool.

use crate::auth::identity::VerifiedIdentity;
use std::collections::{BTreeSet, HashMap};

/// A tool and the scopes a caller must hold to invoke it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationDescriptor {
    name: String,
    required_scopes: Vec<String>,
}

impl OperationDescriptor {
    /// Duplicate scopes are dropped; declaration order is kept.
    pub fn new<I, S>(name: impl Into<String>, required_scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scopes: Vec<String> = Vec::new();
        for scope in required_scopes {
            let scope = scope.into();
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Self {
            name: name.into(),
            required_scopes: scopes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.required_scopes
    }
}

/// Result of comparing granted scopes with required ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeDecision {
    Allowed,
    Denied { missing: Vec<String> },
}

/// Every required scope must be granted.
pub fn authorize(granted: &BTreeSet<String>, required: &[String]) -> ScopeDecision {
    let missing: Vec<String> = required
        .iter()
        .filter(|scope| !granted.contains(*scope))
        .cloned()
        .collect();
    if missing.is_empty() {
        ScopeDecision::Allowed
    } else {
        ScopeDecision::Denied { missing }
    }
}

/// Outcome of authorizing a named operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationAccess<'a> {
    Allowed,
    Denied {
        operation: &'a OperationDescriptor,
        missing: Vec<String>,
    },
    /// The registry does not know this name. Left for the RPC layer to
    /// reject.
    Unregistered,
}

/// Immutable map from operation name to its descriptor.
#[derive(Clone, Debug, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, OperationDescriptor>,
}

impl OperationRegistry {
    pub fn new(operations: impl IntoIterator<Item = OperationDescriptor>) -> Self {
        Self {
            operations: operations
                .into_iter()
                .map(|op| (op.name.clone(), op))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.values()
    }

    /// Every scope any operation requires, sorted.
    pub fn scopes(&self) -> BTreeSet<&str> {
        self.iter()
            .flat_map(|op| op.required_scopes.iter().map(String::as_str))
            .collect()
    }

    pub fn authorize(&self, identity: &VerifiedIdentity, name: &str) -> OperationAccess<'_> {
        let Some(operation) = self.get(name) else {
            return OperationAccess::Unregistered;
        };
        match authorize(&identity.scopes, &operation.required_scopes) {
            ScopeDecision::Allowed => OperationAccess::Allowed,
            ScopeDecision::Denied { missing } => OperationAccess::Denied { operation, missing },
        }
    }
}

impl FromIterator<OperationDescriptor> for OperationRegistry {
    fn from_iter<T: IntoIterator<Item = OperationDescriptor>>(iter: T) -> Self {
        Self::new(iter)
    }
}
