use serde::{Deserialize, Serialize};

use crate::{Role, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCount {
    pub role: Role,
    pub count: usize,
}

impl RoleCount {
    /// Share of `total` as a percentage. An empty registry yields 0.0
    /// instead of dividing by zero.
    pub fn percentage(&self, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        self.count as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReport {
    pub total_users: usize,
    /// Roles in the order they were first seen.
    pub roles: Vec<RoleCount>,
    /// Most common domains first; equal counts keep first-seen order.
    pub domains: Vec<DomainCount>,
    #[serde(default)]
    pub malformed_emails: usize,
}

impl UserReport {
    pub fn is_empty(&self) -> bool {
        self.total_users == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddUserResult {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindUsersResult {
    pub users: Vec<User>,
}
