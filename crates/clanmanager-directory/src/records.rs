use chrono::{DateTime, Utc};
use clanmanager_core::{ClanId, ClanMember, ExpiryPolicy, MemberId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{row_to_member, MEMBER_SELECT_SQL};
use crate::error::{DirectoryError, Result};

/// Insert a clan row and return its generated id.
pub fn create_clan(conn: &Connection, name: &str, tag: &str, verification_code: &str) -> Result<ClanId> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO clans (name, tag, verification_code, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, tag, verification_code, now],
    )?;
    Ok(ClanId(conn.last_insert_rowid()))
}

/// Insert a member row. `verified_at` is the instant of their most recent
/// verification, usually the join time.
pub fn add_member(
    conn: &Connection,
    clan_id: ClanId,
    nickname: &str,
    discord_user_id: u64,
    verified_at: DateTime<Utc>,
) -> Result<ClanMember> {
    let exists: Option<i64> = conn
        .query_row("SELECT id FROM clans WHERE id = ?1", [clan_id.0], |row| row.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(DirectoryError::ClanNotFound(clan_id));
    }
    conn.execute(
        "INSERT INTO clan_members (clan_id, nickname, discord_user_id, verified_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![clan_id.0, nickname, discord_user_id as i64, verified_at.to_rfc3339()],
    )?;
    Ok(ClanMember {
        id: MemberId(conn.last_insert_rowid()),
        clan_id,
        nickname: nickname.to_string(),
        discord_user_id,
        verified_at,
    })
}

/// Load a member by primary key. Returns None instead of an error when absent
/// so callers decide whether missing is exceptional in their context.
pub fn get_member(conn: &Connection, member_id: MemberId) -> Result<Option<ClanMember>> {
    let sql = format!("{MEMBER_SELECT_SQL} WHERE id = ?1");
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt.query_row([member_id.0], row_to_member).optional()?)
}

/// Snapshot of every member id currently in `clan_id`.
pub fn list_member_ids(conn: &Connection, clan_id: ClanId) -> Result<Vec<MemberId>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM clan_members WHERE clan_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map([clan_id.0], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids.into_iter().map(MemberId).collect())
}

/// Delete a member row. Returns false if nothing was deleted.
pub fn delete_member(conn: &Connection, member_id: MemberId) -> Result<bool> {
    let n = conn.execute("DELETE FROM clan_members WHERE id = ?1", [member_id.0])?;
    Ok(n > 0)
}

pub fn set_verified_at(conn: &Connection, member_id: MemberId, verified_at: DateTime<Utc>) -> Result<()> {
    let n = conn.execute(
        "UPDATE clan_members SET verified_at = ?2 WHERE id = ?1",
        params![member_id.0, verified_at.to_rfc3339()],
    )?;
    if n == 0 {
        return Err(DirectoryError::MemberNotFound(member_id));
    }
    Ok(())
}

pub fn get_policy(conn: &Connection, clan_id: ClanId) -> Result<Option<ExpiryPolicy>> {
    let days: Option<i64> = conn
        .query_row(
            "SELECT number_of_days FROM reverification_features WHERE clan_id = ?1",
            [clan_id.0],
            |row| row.get(0),
        )
        .optional()?;
    Ok(days.map(|d| ExpiryPolicy::new(clan_id, clamp_days(d))))
}

/// Create or update the policy row for `clan_id`.
pub fn upsert_policy(conn: &Connection, clan_id: ClanId, interval_days: u16) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn.execute(
        "INSERT INTO reverification_features (clan_id, number_of_days, updated_at)
         SELECT id, ?2, ?3 FROM clans WHERE id = ?1
         ON CONFLICT(clan_id) DO UPDATE SET number_of_days = excluded.number_of_days,
                                            updated_at = excluded.updated_at",
        params![clan_id.0, i64::from(interval_days), now],
    )?;
    if n == 0 {
        return Err(DirectoryError::ClanNotFound(clan_id));
    }
    Ok(())
}

/// Remove the policy row. Returns false if the feature was not enabled.
pub fn delete_policy(conn: &Connection, clan_id: ClanId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM reverification_features WHERE clan_id = ?1",
        [clan_id.0],
    )?;
    Ok(n > 0)
}

/// Every enabled policy, ordered by clan id.
pub fn list_policies(conn: &Connection) -> Result<Vec<ExpiryPolicy>> {
    let mut stmt = conn.prepare_cached(
        "SELECT clan_id, number_of_days FROM reverification_features ORDER BY clan_id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .map(|(clan, days)| ExpiryPolicy::new(ClanId(clan), clamp_days(days)))
        .collect())
}

// The CHECK constraint keeps the column non-negative; rows written by other
// tools may still exceed u16.
fn clamp_days(days: i64) -> u16 {
    days.clamp(0, i64::from(u16::MAX)) as u16
}
