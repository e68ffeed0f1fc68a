use fastrace::trace;
use roster_output::format_user_report;
use roster_types::*;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0}")]
    InvalidRole(#[from] UnknownRole),
}

/// In-memory user store. Users are kept in insertion order and never
/// removed, so ids are assigned from a counter that only moves forward.
#[derive(Debug, Clone)]
pub struct UserRegistry {
    users: Vec<User>,
    index: FxHashMap<UserId, usize>,
    next_id: UserId,
    default_role: Role,
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::with_default_role(Role::default())
    }

    /// Registry whose `add_user` falls back to `role` when none is given.
    pub fn with_default_role(role: Role) -> Self {
        Self {
            users: Vec::new(),
            index: FxHashMap::default(),
            next_id: 1,
            default_role: role,
        }
    }

    pub fn default_role(&self) -> Role {
        self.default_role
    }

    pub fn next_id(&self) -> UserId {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.index.get(&id).map(|&pos| &self.users[pos])
    }

    /// Adds a user, parsing `role` first so an unknown role leaves the
    /// registry and the id counter untouched.
    pub fn add_user(
        &mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Option<&str>,
    ) -> Result<&User, RegistryError> {
        let role = match role {
            Some(role) => role.parse::<Role>()?,
            None => self.default_role,
        };
        Ok(self.insert(name, email, role))
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> &User {
        let id = self.next_id;
        self.next_id += 1;

        let user = User::new(id, name.into(), email.into(), role);
        debug!("Adding user {} ({}, {})", id, user.email, role);

        let pos = self.users.len();
        self.users.push(user);
        self.index.insert(id, pos);
        &self.users[pos]
    }

    #[trace]
    pub fn find_users(&self, criteria: &Criteria) -> Vec<&User> {
        if let Some(id) = criteria.id {
            // Ids are unique, so the index answers the id part directly.
            return self
                .get(id)
                .filter(|user| criteria.matches(user))
                .into_iter()
                .collect();
        }

        let found: Vec<&User> = self
            .users
            .iter()
            .filter(|user| criteria.matches(user))
            .collect();
        debug!("Criteria {:?} matched {} user(s)", criteria, found.len());
        found
    }

    pub fn report(&self) -> UserReport {
        self.report_with_limit(DEFAULT_TOP_DOMAINS)
    }

    /// Role counts in first-seen order and the `top_domains` most common
    /// email domains. Domains with equal counts keep first-seen order.
    #[trace]
    pub fn report_with_limit(&self, top_domains: usize) -> UserReport {
        let mut roles: Vec<RoleCount> = Vec::new();
        let mut domains: Vec<DomainCount> = Vec::new();
        let mut domain_index: FxHashMap<String, usize> = FxHashMap::default();
        let mut malformed_emails = 0;

        for user in &self.users {
            match roles.iter_mut().find(|entry| entry.role == user.role) {
                Some(entry) => entry.count += 1,
                None => roles.push(RoleCount {
                    role: user.role,
                    count: 1,
                }),
            }

            let Some(domain) = user.domain() else {
                debug!(
                    "Excluding malformed email {:?} of user {} from domain stats",
                    user.email, user.id
                );
                malformed_emails += 1;
                continue;
            };

            match domain_index.get(&domain) {
                Some(&pos) => domains[pos].count += 1,
                None => {
                    domain_index.insert(domain.clone(), domains.len());
                    domains.push(DomainCount { domain, count: 1 });
                }
            }
        }

        // sort_by is stable, which is what keeps ties in first-seen order.
        domains.sort_by(|a, b| b.count.cmp(&a.count));
        domains.truncate(top_domains);

        UserReport {
            total_users: self.users.len(),
            roles,
            domains,
            malformed_emails,
        }
    }

    pub fn generate_user_report(&self) -> String {
        format_user_report(&self.report())
    }
}
