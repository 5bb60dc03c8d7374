//! Contact picker data: everyone except the signed-in user.

use tracing::debug;

use murmur_shared::provider::DirectoryProvider;
use murmur_shared::{Identity, Result, UserId};

#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    contacts: Vec<Identity>,
}

impl DirectoryLoader {
    pub async fn load<D: DirectoryProvider + ?Sized>(provider: &D, local: &UserId) -> Result<Self> {
        let mut contacts = provider.list_profiles(local).await?;
        contacts.retain(|c| c.id != *local);
        contacts.sort_by(|a, b| a.username.cmp(&b.username));
        debug!(count = contacts.len(), "Directory loaded");
        Ok(Self { contacts })
    }

    pub fn contacts(&self) -> &[Identity] {
        &self.contacts
    }

    pub fn find(&self, id: &UserId) -> Option<&Identity> {
        self.contacts.iter().find(|c| c.id == *id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&Identity> {
        let username = username.trim();
        self.contacts.iter().find(|c| c.username == username)
    }

    /// Case-insensitive match on username, first name or last name.
    pub fn filter(&self, query: &str) -> Vec<&Identity> {
        let query = query.trim().to_lowercase();
        self.contacts
            .iter()
            .filter(|c| {
                query.is_empty()
                    || c.username.to_lowercase().contains(&query)
                    || c.first_name.to_lowercase().contains(&query)
                    || c.last_name.to_lowercase().contains(&query)
            })
            .collect()
    }
}
