//! Node-wide key/value settings.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn get_option(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM options WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// First writer wins; later callers read back the stored value.
    pub fn insert_option_if_absent(&self, key: &str, value: &[u8]) -> Result<Vec<u8>> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO options (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        let stored = conn.query_row(
            "SELECT value FROM options WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;

    #[test]
    fn test_first_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("node.db")).unwrap();

        assert_eq!(db.get_option("secret").unwrap(), None);
        assert_eq!(db.insert_option_if_absent("secret", b"first").unwrap(), b"first");
        assert_eq!(db.insert_option_if_absent("secret", b"second").unwrap(), b"first");
        assert_eq!(db.get_option("secret").unwrap().unwrap(), b"first");
    }
}
