use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interval applied when a clan enables reverification without choosing one.
pub const DEFAULT_INTERVAL_DAYS: u16 = 90;

/// Primary key of a clan row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClanId(pub i64);

impl fmt::Display for ClanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ClanId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Primary key of a clan member row. One Discord user may hold several of
/// these (one per clan they joined).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MemberId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The subset of a clan member record the reverification scheduler reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanMember {
    pub id: MemberId,
    pub clan_id: ClanId,
    pub nickname: String,
    pub discord_user_id: u64,
    /// Last time the member proved they still belong to the clan.
    pub verified_at: DateTime<Utc>,
}

/// Reverification settings of a single clan. A clan without a policy row has
/// the feature disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    pub clan_id: ClanId,
    /// Days after the last verification before the member expires.
    pub interval_days: u16,
}

impl ExpiryPolicy {
    pub fn new(clan_id: ClanId, interval_days: u16) -> Self {
        Self {
            clan_id,
            interval_days,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::days(i64::from(self.interval_days))
    }

    /// Instant at which a member verified at `verified_at` expires.
    pub fn expires_at(&self, verified_at: DateTime<Utc>) -> DateTime<Utc> {
        verified_at + self.interval()
    }
}
