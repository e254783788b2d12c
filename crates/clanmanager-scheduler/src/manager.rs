use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clanmanager_core::{ClanId, ClanMember, ExpiryPolicy, MemberId, ReverificationConfig};
use clanmanager_directory::{DirectoryError, MemberDirectory, PolicyStore};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::action::{ActionExecutor, RemoveMemberAction};
use crate::engine::ScheduleEngine;
use crate::error::{Result, SchedulerError};
use crate::notify::Notifier;
use crate::schedule::compute_fire_at;

/// Outcome of a clan-wide (re)schedule.
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Members with an armed schedule afterwards.
    pub scheduled: usize,
    /// Members left alone because the policy was gone by the time they were
    /// looked at.
    pub skipped: usize,
    /// Members that could not be scheduled. The rest of the clan was still
    /// processed.
    pub failed: Vec<(MemberId, SchedulerError)>,
}

/// Keeps the schedule engine in line with the persisted policies.
///
/// Owns startup recovery and the clan-wide enable/disable operations;
/// individual member events go through [`schedule_member`](Self::schedule_member)
/// and [`cancel_member`](Self::cancel_member).
pub struct ReverificationManager {
    engine: ScheduleEngine,
    policies: Arc<dyn PolicyStore>,
    directory: Arc<dyn MemberDirectory>,
    settings: ReverificationConfig,
    ready: AtomicBool,
}

impl ReverificationManager {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        directory: Arc<dyn MemberDirectory>,
        executor: Arc<dyn ActionExecutor>,
        settings: ReverificationConfig,
    ) -> Self {
        let engine = ScheduleEngine::new(Arc::clone(&policies), Arc::clone(&directory), executor);
        Self {
            engine,
            policies,
            directory,
            settings,
            ready: AtomicBool::new(false),
        }
    }

    /// Wire up the default expiry action: notify, then remove from the clan.
    pub fn with_default_action(
        policies: Arc<dyn PolicyStore>,
        directory: Arc<dyn MemberDirectory>,
        notifier: Arc<dyn Notifier>,
        settings: ReverificationConfig,
    ) -> Self {
        let executor = Arc::new(RemoveMemberAction::new(
            Arc::clone(&directory),
            notifier,
            settings.clone(),
        ));
        Self::new(policies, directory, executor, settings)
    }

    pub fn engine(&self) -> &ScheduleEngine {
        &self.engine
    }

    /// True once [`start`](Self::start) has finished, whether or not
    /// recovery found anything.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Rebuild every schedule from the persisted policies and member
    /// verification times. Returns how many members were scheduled.
    ///
    /// Enumeration failures are logged and recover nothing for the affected
    /// clan (or for everything, if the policy list itself is unreadable); the
    /// manager is ready afterwards either way.
    pub async fn start(&self) -> usize {
        let policies = Arc::clone(&self.policies);
        let listed = tokio::task::spawn_blocking(move || policies.list_policies()).await;
        let policies = match listed {
            Ok(Ok(policies)) => policies,
            Ok(Err(e)) => {
                warn!(error = %e, "could not enumerate reverification policies, recovering nothing");
                self.ready.store(true, Ordering::Release);
                return 0;
            }
            Err(e) => {
                warn!(error = %e, "policy enumeration task failed, recovering nothing");
                self.ready.store(true, Ordering::Release);
                return 0;
            }
        };

        let clans = policies.len();
        let mut batches = stream::iter(policies)
            .map(|policy| {
                let directory = Arc::clone(&self.directory);
                async move {
                    let loaded =
                        tokio::task::spawn_blocking(move || load_clan(directory.as_ref(), policy.clan_id))
                            .await
                            .unwrap_or_else(|e| Err(SchedulerError::DirectoryUnavailable(e.to_string())));
                    (policy, loaded)
                }
            })
            .buffer_unordered(self.settings.recovery_concurrency.max(1));

        let mut recovered = 0;
        while let Some((policy, loaded)) = batches.next().await {
            match loaded {
                Ok(members) => {
                    for member in &members {
                        self.arm(member, &policy);
                    }
                    debug!(clan_id = %policy.clan_id, count = members.len(), "clan recovered");
                    recovered += members.len();
                }
                Err(e) => {
                    warn!(clan_id = %policy.clan_id, error = %e, "could not list clan members, clan skipped");
                }
            }
        }

        self.ready.store(true, Ordering::Release);
        info!(clans, recovered, "reverification recovery complete");
        recovered
    }

    /// (Re)schedule one member from their clan's policy and their last
    /// verification. Returns the fire time, or `None` when the clan has the
    /// feature disabled.
    pub fn schedule_member(&self, member_id: MemberId) -> Result<Option<DateTime<Utc>>> {
        let member = self.directory.get_member(member_id)?;
        let Some(policy) = self.policies.get_policy(member.clan_id)? else {
            debug!(member_id = %member_id, clan_id = %member.clan_id, "reverification disabled, not scheduling");
            return Ok(None);
        };
        Ok(Some(self.arm(&member, &policy)))
    }

    /// Drop the member's schedule, e.g. because they left the clan. Returns
    /// false if nothing was scheduled.
    pub fn cancel_member(&self, member_id: MemberId) -> bool {
        self.engine.cancel(member_id)
    }

    /// Record a renewed verification and push the member's expiry out
    /// accordingly.
    pub fn reverify(&self, member_id: MemberId, verified_at: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        self.directory.set_verified_at(member_id, verified_at)?;
        info!(member_id = %member_id, %verified_at, "member reverified");
        self.schedule_member(member_id)
    }

    /// Enable the feature for a clan (or change its interval) and schedule
    /// every current member. Already-armed members are rescheduled against
    /// the new interval.
    pub fn enable_for_group(&self, clan_id: ClanId, interval_days: u16) -> Result<BulkReport> {
        self.policies.set_policy(clan_id, interval_days)?;
        info!(clan_id = %clan_id, interval_days, "reverification enabled");
        self.schedule_clan(clan_id)
    }

    /// [`enable_for_group`](Self::enable_for_group) with the configured
    /// default interval.
    pub fn enable_for_group_default(&self, clan_id: ClanId) -> Result<BulkReport> {
        self.enable_for_group(clan_id, self.settings.default_interval_days)
    }

    /// Change the interval of a clan that already has the feature enabled.
    /// A disabled clan stays disabled and nothing is scheduled.
    pub fn set_interval(&self, clan_id: ClanId, interval_days: u16) -> Result<BulkReport> {
        if self.policies.get_policy(clan_id)?.is_none() {
            debug!(clan_id = %clan_id, "reverification disabled, interval not changed");
            return Ok(BulkReport::default());
        }
        self.enable_for_group(clan_id, interval_days)
    }

    /// Disable the feature for a clan and cancel every member's schedule.
    /// Returns how many schedules were cancelled.
    pub fn disable_for_group(&self, clan_id: ClanId) -> Result<usize> {
        self.policies.clear_policy(clan_id)?;

        let mut cancelled = match self.directory.list_members(clan_id) {
            Ok(members) => members
                .into_iter()
                .filter(|id| self.cancel_member(*id))
                .count(),
            Err(e) => {
                warn!(clan_id = %clan_id, error = %e, "could not list clan members, cancelling by clan");
                0
            }
        };
        // Catches members that left the directory without being cancelled.
        cancelled += self.engine.cancel_clan(clan_id);

        info!(clan_id = %clan_id, cancelled, "reverification disabled");
        Ok(cancelled)
    }

    /// Disarm all timers. Schedules come back on the next [`start`](Self::start).
    pub fn shutdown(&self) -> usize {
        self.ready.store(false, Ordering::Release);
        self.engine.shutdown()
    }

    fn schedule_clan(&self, clan_id: ClanId) -> Result<BulkReport> {
        let members = self.directory.list_members(clan_id)?;
        let mut report = BulkReport::default();
        for member_id in members {
            match self.schedule_member(member_id) {
                Ok(Some(_)) => report.scheduled += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(clan_id = %clan_id, member_id = %member_id, error = %e, "could not schedule member");
                    report.failed.push((member_id, e));
                }
            }
        }
        if report.failed.is_empty() {
            info!(clan_id = %clan_id, scheduled = report.scheduled, "clan scheduled");
        } else {
            warn!(
                clan_id = %clan_id,
                scheduled = report.scheduled,
                failed = report.failed.len(),
                "clan scheduled with failures"
            );
        }
        Ok(report)
    }

    fn arm(&self, member: &ClanMember, policy: &ExpiryPolicy) -> DateTime<Utc> {
        let fire_at = compute_fire_at(member, policy);
        self.engine.schedule(member.id, member.clan_id, fire_at);
        fire_at
    }
}

/// Load every current member of a clan. Runs on the blocking pool.
///
/// Only a failed listing fails the clan; a member that cannot be loaded is
/// logged and left out.
fn load_clan(directory: &dyn MemberDirectory, clan_id: ClanId) -> Result<Vec<ClanMember>> {
    let ids = directory.list_members(clan_id)?;
    let mut members = Vec::with_capacity(ids.len());
    for id in ids {
        match directory.get_member(id) {
            Ok(member) => members.push(member),
            // Left between the listing and the lookup.
            Err(DirectoryError::MemberNotFound(_)) => continue,
            Err(e) => {
                warn!(clan_id = %clan_id, member_id = %id, error = %e, "could not load member, not recovered");
            }
        }
    }
    Ok(members)
}
