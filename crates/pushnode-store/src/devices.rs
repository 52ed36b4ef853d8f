//! CRUD operations for [`Device`] records.

use pushnode_shared::constants::MAX_PUSH_DEVICES;
use rusqlite::params;

use crate::database::{now_millis, Database};
use crate::error::{Result, StoreError};
use crate::models::Device;

impl Database {
    /// Bind (or re-bind) a device to `uid`. An existing push token is kept.
    pub fn bind_device(
        &self,
        uid: &str,
        uuid: &str,
        public_key: &[u8],
        device_type: i32,
    ) -> Result<()> {
        let now = now_millis();
        self.conn().execute(
            "INSERT INTO devices (uuid, uid, key, type, lastupdate, createtime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(uuid) DO UPDATE SET
                 uid = excluded.uid,
                 key = excluded.key,
                 type = excluded.type,
                 lastupdate = excluded.lastupdate",
            params![uuid, uid, public_key, device_type, now],
        )?;
        Ok(())
    }

    pub fn unbind_device(&self, uid: &str, uuid: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM devices WHERE uuid = ?1 AND uid = ?2",
            params![uuid, uid],
        )?;
        Ok(())
    }

    /// `StoreError::NotFound` when the device is not bound to `uid`.
    pub fn update_push_token(
        &self,
        uid: &str,
        uuid: &str,
        token: &[u8],
        sandbox: bool,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE devices SET token = ?1, sandbox = ?2, lastupdate = ?3
             WHERE uuid = ?4 AND uid = ?5",
            params![token, sandbox, now_millis(), uuid, uid],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn get_device_key(&self, uuid: &str) -> Result<Vec<u8>> {
        self.conn()
            .query_row(
                "SELECT key FROM devices WHERE uuid = ?1",
                params![uuid],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn get_devices(&self, uid: &str) -> Result<Vec<Device>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT uuid, uid, key, token, sandbox, type
             FROM devices
             WHERE uid = ?1 AND token IS NOT NULL AND length(token) > 0
             ORDER BY lastupdate DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![uid, MAX_PUSH_DEVICES as i64], row_to_device)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        uuid: row.get(0)?,
        uid: row.get(1)?,
        public_key: row.get(2)?,
        push_token: row.get(3)?,
        sandbox: row.get(4)?,
        device_type: row.get(5)?,
    })
}
