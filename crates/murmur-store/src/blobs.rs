use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::{format_ts, Database};
use crate::error::{Result, StoreError};

/// A stored attachment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl Database {
    /// Store a blob under its content key. Storing the same content twice
    /// is a no-op.
    pub fn insert_blob(&self, key: &str, mime: &str, data: &[u8]) -> Result<()> {
        if blake3::hash(data).to_hex().as_str() != key {
            return Err(StoreError::Constraint(format!(
                "blob content does not match key {key}"
            )));
        }
        self.conn().execute(
            "INSERT OR IGNORE INTO blobs (key, mime, size, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, mime, data.len() as i64, data, format_ts(&Utc::now())],
        )?;
        Ok(())
    }

    pub fn get_blob(&self, key: &str) -> Result<Option<StoredBlob>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT key, mime, data FROM blobs WHERE key = ?1",
                params![key],
                |row| {
                    Ok(StoredBlob {
                        key: row.get(0)?,
                        mime: row.get(1)?,
                        data: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_is_content_addressed() {
        let db = Database::open_in_memory().unwrap();
        let data = b"RIFF....WAVE";
        let key = blake3::hash(data).to_hex().to_string();

        db.insert_blob(&key, "audio/wav", data).unwrap();
        db.insert_blob(&key, "audio/wav", data).unwrap();

        let blob = db.get_blob(&key).unwrap().unwrap();
        assert_eq!(blob.data, data.to_vec());
        assert_eq!(blob.mime, "audio/wav");
        assert!(db.get_blob("missing").unwrap().is_none());
    }

    #[test]
    fn test_blob_key_mismatch_rejected() {
        let db = Database::open_in_memory().unwrap();
        let key = blake3::hash(b"one").to_hex().to_string();
        assert!(matches!(
            db.insert_blob(&key, "text/plain", b"two"),
            Err(StoreError::Constraint(_))
        ));
    }
}
