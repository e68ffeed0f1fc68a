use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type UserId = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid role '{0}' (expected one of: admin, user, moderator)")]
pub struct UnknownRole(pub String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
    Moderator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Moderator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Moderator => "moderator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Role names are matched exactly; `Admin` is not `admin`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn new(id: UserId, name: String, email: String, role: Role) -> Self {
        Self {
            id,
            name,
            email,
            role,
        }
    }

    /// Lowercased part after `@`, or `None` unless the address splits into
    /// exactly two parts.
    pub fn domain(&self) -> Option<String> {
        let mut parts = self.email.split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(domain), None) => Some(domain.to_lowercase()),
            _ => None,
        }
    }
}
