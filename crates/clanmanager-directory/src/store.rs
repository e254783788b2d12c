use chrono::{DateTime, Utc};
use clanmanager_core::{ClanId, ClanMember, ExpiryPolicy, MemberId};

use crate::error::Result;

/// Per-clan reverification settings.
///
/// Implementations are called from scheduler tasks and from the blocking
/// pool, so they must be `Send + Sync` and cheap to share behind an `Arc`.
pub trait PolicyStore: Send + Sync {
    /// `None` means the feature is disabled for this clan.
    fn get_policy(&self, clan_id: ClanId) -> Result<Option<ExpiryPolicy>>;

    /// Enable the feature, or change the interval of an enabled clan.
    fn set_policy(&self, clan_id: ClanId, interval_days: u16) -> Result<()>;

    /// Disable the feature. Clearing an already-disabled clan is not an error.
    fn clear_policy(&self, clan_id: ClanId) -> Result<()>;

    /// Every clan that currently has the feature enabled.
    fn list_policies(&self) -> Result<Vec<ExpiryPolicy>>;
}

/// Read access to clan membership plus the two mutations the scheduler needs.
pub trait MemberDirectory: Send + Sync {
    /// Fails with [`DirectoryError::MemberNotFound`](crate::DirectoryError::MemberNotFound)
    /// when no such member exists.
    fn get_member(&self, member_id: MemberId) -> Result<ClanMember>;

    /// Snapshot of the clan's member ids at call time.
    fn list_members(&self, clan_id: ClanId) -> Result<Vec<MemberId>>;

    /// Remove the member from their clan.
    fn remove_member(&self, member_id: MemberId) -> Result<()>;

    /// Record a renewed verification.
    fn set_verified_at(&self, member_id: MemberId, verified_at: DateTime<Utc>) -> Result<()>;
}
