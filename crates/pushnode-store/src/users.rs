//! CRUD operations for [`User`] records.

use pushnode_shared::UserSecret;
use rusqlite::params;

use crate::database::{now_millis, Database};
use crate::error::{Result, StoreError};
use crate::models::User;

impl Database {
    pub fn get_user(&self, uid: &str) -> Result<User> {
        let row = self
            .conn()
            .query_row(
                "SELECT uid, pubkey, seckey, flags FROM users WHERE uid = ?1",
                params![uid],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        let (uid, public_key, seckey, flags) = row;
        let secret = UserSecret::from_slice(&seckey).ok_or(StoreError::Corrupt("users.seckey"))?;
        Ok(User {
            uid,
            public_key,
            secret,
            flags,
        })
    }

    // Concurrent first registrations of one uid race here; the row that
    // lands first keeps its secret. Flags follow the latest bind.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let now = now_millis();
        self.conn().execute(
            "INSERT INTO users (uid, pubkey, seckey, flags, lastupdate, createtime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(uid) DO UPDATE SET
                 pubkey = excluded.pubkey,
                 flags = excluded.flags,
                 lastupdate = excluded.lastupdate",
            params![
                user.uid,
                user.public_key,
                user.secret.as_bytes().as_slice(),
                user.flags,
                now,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::USER_FLAG_SERVERFUL;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("users.db")).unwrap();
        (dir, db)
    }

    fn user(secret_byte: u8, flags: u32) -> User {
        User {
            uid: "ABOO6TSIXKSEVIJKXLDQSUXQRXUAOXGGYY".into(),
            public_key: vec![0x04; 65],
            secret: UserSecret::new([secret_byte; 64]),
            flags,
        }
    }

    #[test]
    fn test_unknown_user() {
        let (_dir, db) = open();
        assert!(matches!(db.get_user("nobody"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_upsert_then_get() {
        let (_dir, db) = open();
        db.upsert_user(&user(7, 0)).unwrap();
        let stored = db.get_user("ABOO6TSIXKSEVIJKXLDQSUXQRXUAOXGGYY").unwrap();
        assert_eq!(stored, user(7, 0));
        assert!(stored.is_serverless());
    }

    #[test]
    fn test_upsert_keeps_existing_secret() {
        let (_dir, db) = open();
        db.upsert_user(&user(7, 0)).unwrap();
        db.upsert_user(&user(9, USER_FLAG_SERVERFUL)).unwrap();

        let stored = db.get_user("ABOO6TSIXKSEVIJKXLDQSUXQRXUAOXGGYY").unwrap();
        assert_eq!(stored.secret, UserSecret::new([7; 64]));
        assert!(!stored.is_serverless());
    }

    #[test]
    fn test_rebind_without_device_returns_to_serverless() {
        let (_dir, db) = open();
        db.upsert_user(&user(7, USER_FLAG_SERVERFUL)).unwrap();
        db.upsert_user(&user(7, 0)).unwrap();

        let stored = db.get_user("ABOO6TSIXKSEVIJKXLDQSUXQRXUAOXGGYY").unwrap();
        assert_eq!(stored.flags, 0);
        assert!(stored.is_serverless());
    }
}
