use std::sync::Arc;

use async_trait::async_trait;
use clanmanager_core::{ClanMember, ReverificationConfig};
use clanmanager_directory::MemberDirectory;
use tracing::{info, warn};

use crate::error::Result;
use crate::notify::Notifier;

/// What happens to a member whose verification expired.
///
/// The engine calls this at most once per armed schedule, outside any of its
/// locks. A cancel that races with a fire may still lose, so implementations
/// should be safe to apply to a member that was just rescheduled.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, member: &ClanMember) -> Result<()>;
}

/// Default expiry: tell the member to verify again, then remove them from
/// the clan.
pub struct RemoveMemberAction {
    directory: Arc<dyn MemberDirectory>,
    notifier: Arc<dyn Notifier>,
    settings: ReverificationConfig,
}

impl RemoveMemberAction {
    pub fn new(
        directory: Arc<dyn MemberDirectory>,
        notifier: Arc<dyn Notifier>,
        settings: ReverificationConfig,
    ) -> Self {
        Self {
            directory,
            notifier,
            settings,
        }
    }
}

#[async_trait]
impl ActionExecutor for RemoveMemberAction {
    async fn execute(&self, member: &ClanMember) -> Result<()> {
        let message = self.settings.render_message(member.clan_id);
        if let Err(e) = self.notifier.notify(member, &message).await {
            warn!(member_id = %member.id, error = %e, "reverification notice not delivered");
        }

        self.directory.remove_member(member.id)?;
        info!(member_id = %member.id, clan_id = %member.clan_id, "member expired and removed");
        Ok(())
    }
}
