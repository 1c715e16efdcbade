//! Authenticated users.
//!
//! Authorization decisions branch on whether a user is *local* (trusted by
//! the server operator) or *remote* (an external organization's caller).

use std::fmt;

/// Classification of an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    /// Trusted by the server operator.
    Local,
    /// Calling on behalf of an external organization.
    Remote,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Local => write!(f, "local"),
            UserRole::Remote => write!(f, "remote"),
        }
    }
}

/// An authenticated identity with a role and an organizational affiliation.
#[derive(Debug, Clone)]
pub struct User {
    name: String,
    role: UserRole,
    organization: String,
}

impl User {
    /// Creates a local user.
    pub fn local(name: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: UserRole::Local,
            organization: organization.into(),
        }
    }

    /// Creates a remote user.
    pub fn remote(name: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: UserRole::Remote,
            organization: organization.into(),
        }
    }

    /// Returns the user's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the user's role.
    pub fn role(&self) -> UserRole {
        self.role
    }

    /// Returns the identifier of the user's organization.
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Returns `true` if the user is trusted by the server operator.
    pub fn is_local(&self) -> bool {
        self.role == UserRole::Local
    }
}
