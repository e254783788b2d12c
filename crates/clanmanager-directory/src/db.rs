use chrono::{DateTime, Utc};
use clanmanager_core::{ClanId, ClanMember, MemberId};
use rusqlite::{types::Type, Connection, Result};

/// Column order shared by every member query in this crate.
pub(crate) const MEMBER_SELECT_SQL: &str =
    "SELECT id, clan_id, nickname, discord_user_id, verified_at FROM clan_members";

/// Map a SELECT row (column order from MEMBER_SELECT_SQL) to a ClanMember.
pub(crate) fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClanMember> {
    Ok(ClanMember {
        id: MemberId(row.get(0)?),
        clan_id: ClanId(row.get(1)?),
        nickname: row.get(2)?,
        discord_user_id: row.get::<_, i64>(3)? as u64,
        verified_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
    })
}

/// Timestamps are stored as RFC 3339 text; anything else is a corrupt row.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Initialise all tables for the clan directory. Safe to call on every
/// startup; CREATE IF NOT EXISTS makes it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    create_clans_table(conn)?;
    create_members_table(conn)?;
    create_reverification_table(conn)?;
    Ok(())
}

fn create_clans_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS clans (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            name                TEXT NOT NULL,
            tag                 TEXT NOT NULL,
            verification_code   TEXT NOT NULL UNIQUE,
            created_at          TEXT NOT NULL
        );",
    )
}

fn create_members_table(conn: &Connection) -> Result<()> {
    // idx_clan_members_clan serves list_members(), the recovery hot path.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS clan_members (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            clan_id             INTEGER NOT NULL REFERENCES clans(id) ON DELETE CASCADE,
            nickname            TEXT NOT NULL,
            discord_user_id     INTEGER NOT NULL,
            verified_at         TEXT NOT NULL,
            UNIQUE(clan_id, discord_user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_clan_members_clan
            ON clan_members (clan_id);",
    )
}

fn create_reverification_table(conn: &Connection) -> Result<()> {
    // A row here means the feature is enabled for the clan.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reverification_features (
            clan_id         INTEGER PRIMARY KEY NOT NULL REFERENCES clans(id) ON DELETE CASCADE,
            number_of_days  INTEGER NOT NULL DEFAULT 90 CHECK (number_of_days >= 0),
            updated_at      TEXT NOT NULL
        );",
    )
}
