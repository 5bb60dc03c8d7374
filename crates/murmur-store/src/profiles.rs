use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use murmur_shared::{Identity, UserId};

use crate::database::{conversion_error, format_ts, Database};
use crate::error::{Result, StoreError};

/// Fields supplied when registering a profile.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
}

const PROFILE_COLUMNS: &str = "id, username, first_name, last_name, avatar_url";

impl Database {
    pub fn insert_profile(&self, profile: &NewProfile) -> Result<Identity> {
        let username = profile.username.trim();
        if username.is_empty() {
            return Err(StoreError::Constraint("username must not be empty".into()));
        }
        if self.get_profile_by_username(username)?.is_some() {
            return Err(StoreError::Constraint(format!(
                "username '{username}' is already taken"
            )));
        }

        let identity = Identity {
            id: UserId::new(),
            first_name: profile.first_name.trim().to_string(),
            last_name: profile.last_name.trim().to_string(),
            username: username.to_string(),
            avatar_url: profile.avatar_url.clone(),
        };

        self.conn().execute(
            "INSERT INTO profiles (id, username, first_name, last_name, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                identity.id.to_string(),
                identity.username,
                identity.first_name,
                identity.last_name,
                identity.avatar_url,
                format_ts(&Utc::now()),
            ],
        )?;
        Ok(identity)
    }

    pub fn get_profile(&self, id: &UserId) -> Result<Identity> {
        self.conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id.to_string()],
                row_to_identity,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn get_profile_by_username(&self, username: &str) -> Result<Option<Identity>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE username = ?1"),
                params![username.trim()],
                row_to_identity,
            )
            .optional()?)
    }

    /// Every profile except `exclude`, ordered by username.
    pub fn list_profiles_except(&self, exclude: &UserId) -> Result<Vec<Identity>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id <> ?1 ORDER BY username"
        ))?;
        let rows = stmt.query_map(params![exclude.to_string()], row_to_identity)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    let id_str: String = row.get(0)?;
    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;

    Ok(Identity {
        id: UserId(id),
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        avatar_url: row.get(4)?,
    })
}
