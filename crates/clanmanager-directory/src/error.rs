use clanmanager_core::{ClanId, MemberId};
use thiserror::Error;

/// Errors raised by the clan/member system of record. Kept separate from the
/// scheduler's errors so callers can tell "absent" apart from "unreachable".
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Clan member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("Clan not found: {0}")]
    ClanNotFound(ClanId),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
