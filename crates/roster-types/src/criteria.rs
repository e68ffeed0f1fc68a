use serde::{Deserialize, Serialize};

use crate::{Role, User, UserId};

/// Partial user record used to filter the registry. Absent fields match
/// everything; present fields are ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.email.is_none() && self.role.is_none()
    }

    /// Id and role compare exactly, email compares case-sensitively, and name
    /// is a case-insensitive substring match.
    pub fn matches(&self, user: &User) -> bool {
        if let Some(id) = self.id {
            if user.id != id {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !user.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(email) = &self.email {
            if &user.email != email {
                return false;
            }
        }
        if let Some(role) = self.role {
            if user.role != role {
                return false;
            }
        }
        true
    }
}
