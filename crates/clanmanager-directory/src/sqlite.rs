use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use clanmanager_core::{ClanId, ClanMember, ExpiryPolicy, MemberId};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::init_db;
use crate::error::{DirectoryError, Result};
use crate::records;
use crate::store::{MemberDirectory, PolicyStore};

/// SQLite-backed clan directory. Implements both [`PolicyStore`] and
/// [`MemberDirectory`] over one shared connection.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct SqliteDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDirectory {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path, "opened clan directory");
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub fn create_clan(&self, name: &str, tag: &str, verification_code: &str) -> Result<ClanId> {
        let conn = self.lock();
        let id = records::create_clan(&conn, name, tag, verification_code)?;
        info!(clan_id = %id, name, "clan created");
        Ok(id)
    }

    pub fn add_member(
        &self,
        clan_id: ClanId,
        nickname: &str,
        discord_user_id: u64,
        verified_at: DateTime<Utc>,
    ) -> Result<ClanMember> {
        let conn = self.lock();
        let member = records::add_member(&conn, clan_id, nickname, discord_user_id, verified_at)?;
        debug!(member_id = %member.id, clan_id = %clan_id, "member added");
        Ok(member)
    }

    // A poisoned lock only means another thread panicked mid-query; the
    // connection itself is still usable.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PolicyStore for SqliteDirectory {
    fn get_policy(&self, clan_id: ClanId) -> Result<Option<ExpiryPolicy>> {
        records::get_policy(&self.lock(), clan_id)
    }

    fn set_policy(&self, clan_id: ClanId, interval_days: u16) -> Result<()> {
        records::upsert_policy(&self.lock(), clan_id, interval_days)?;
        info!(clan_id = %clan_id, interval_days, "reverification policy stored");
        Ok(())
    }

    fn clear_policy(&self, clan_id: ClanId) -> Result<()> {
        if records::delete_policy(&self.lock(), clan_id)? {
            info!(clan_id = %clan_id, "reverification policy cleared");
        }
        Ok(())
    }

    fn list_policies(&self) -> Result<Vec<ExpiryPolicy>> {
        records::list_policies(&self.lock())
    }
}

impl MemberDirectory for SqliteDirectory {
    fn get_member(&self, member_id: MemberId) -> Result<ClanMember> {
        records::get_member(&self.lock(), member_id)?
            .ok_or(DirectoryError::MemberNotFound(member_id))
    }

    fn list_members(&self, clan_id: ClanId) -> Result<Vec<MemberId>> {
        records::list_member_ids(&self.lock(), clan_id)
    }

    fn remove_member(&self, member_id: MemberId) -> Result<()> {
        if !records::delete_member(&self.lock(), member_id)? {
            return Err(DirectoryError::MemberNotFound(member_id));
        }
        info!(member_id = %member_id, "member removed from clan");
        Ok(())
    }

    fn set_verified_at(&self, member_id: MemberId, verified_at: DateTime<Utc>) -> Result<()> {
        records::set_verified_at(&self.lock(), member_id, verified_at)
    }
}
