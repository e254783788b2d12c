use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use clanmanager_core::{ClanId, MemberId};
use clanmanager_directory::{DirectoryError, MemberDirectory, PolicyStore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action::ActionExecutor;
use crate::schedule::{delay_until, sleep_until};

/// One armed timer. `generation` identifies the arming; a timer that wakes
/// and finds a different generation in the map was superseded and exits.
struct Slot {
    generation: u64,
    clan_id: ClanId,
    fire_at: DateTime<Utc>,
    timer: JoinHandle<()>,
}

struct EngineInner {
    slots: Mutex<HashMap<MemberId, Slot>>,
    next_generation: AtomicU64,
    policies: Arc<dyn PolicyStore>,
    directory: Arc<dyn MemberDirectory>,
    executor: Arc<dyn ActionExecutor>,
}

/// In-process timer scheduler keyed by member id.
///
/// Every armed schedule is its own tokio task, so a slow action for one member
/// never delays another member's fire. The slot map is guarded by a single
/// mutex that is only held for map operations; the action always runs after
/// the slot has been removed and the lock released.
///
/// Cloning is cheap; clones share the same timers.
#[derive(Clone)]
pub struct ScheduleEngine {
    inner: Arc<EngineInner>,
}

impl ScheduleEngine {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        directory: Arc<dyn MemberDirectory>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                slots: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                policies,
                directory,
                executor,
            }),
        }
    }

    /// Arm a timer that expires `member_id` at `fire_at`, replacing any
    /// existing one. A `fire_at` at or before now fires right away.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, member_id: MemberId, clan_id: ClanId, fire_at: DateTime<Utc>) {
        let delay = delay_until(fire_at, Utc::now());
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut slots = self.inner.lock_slots();
        if let Some(old) = slots.remove(&member_id) {
            old.timer.abort();
            debug!(member_id = %member_id, old_fire_at = %old.fire_at, "replacing schedule");
        }

        // The new task cannot claim its slot before we insert it: fire()
        // needs the lock we are holding.
        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            sleep_until(fire_at, delay).await;
            inner.fire(member_id, generation).await;
        });
        slots.insert(
            member_id,
            Slot {
                generation,
                clan_id,
                fire_at,
                timer,
            },
        );
        drop(slots);

        if delay.is_zero() {
            info!(member_id = %member_id, %fire_at, "reverification overdue, firing now");
        } else {
            info!(member_id = %member_id, %fire_at, "reverification scheduled");
        }
    }

    /// Disarm the member's timer. Returns false if nothing was scheduled.
    ///
    /// A fire whose action already started is not interrupted.
    pub fn cancel(&self, member_id: MemberId) -> bool {
        let removed = self.inner.lock_slots().remove(&member_id);
        match removed {
            Some(slot) => {
                slot.timer.abort();
                info!(member_id = %member_id, "reverification cancelled");
                true
            }
            None => false,
        }
    }

    /// Disarm every timer armed for a member of `clan_id`.
    pub fn cancel_clan(&self, clan_id: ClanId) -> usize {
        let removed: Vec<(MemberId, Slot)> = {
            let mut slots = self.inner.lock_slots();
            let ids: Vec<MemberId> = slots
                .iter()
                .filter(|(_, slot)| slot.clan_id == clan_id)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| slots.remove(&id).map(|slot| (id, slot)))
                .collect()
        };
        for (_, slot) in &removed {
            slot.timer.abort();
        }
        if !removed.is_empty() {
            info!(clan_id = %clan_id, count = removed.len(), "clan reverifications cancelled");
        }
        removed.len()
    }

    pub fn is_scheduled(&self, member_id: MemberId) -> bool {
        self.inner.lock_slots().contains_key(&member_id)
    }

    pub fn fire_at(&self, member_id: MemberId) -> Option<DateTime<Utc>> {
        self.inner.lock_slots().get(&member_id).map(|slot| slot.fire_at)
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.lock_slots().len()
    }

    /// Armed schedules ordered by fire time.
    pub fn snapshot(&self) -> Vec<(MemberId, DateTime<Utc>)> {
        let mut entries: Vec<_> = self
            .inner
            .lock_slots()
            .iter()
            .map(|(id, slot)| (*id, slot.fire_at))
            .collect();
        entries.sort_by_key(|(id, at)| (*at, *id));
        entries
    }

    /// Disarm everything. Pending schedules are rebuilt by recovery on the
    /// next start.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Slot> = self.inner.lock_slots().drain().map(|(_, slot)| slot).collect();
        for slot in &drained {
            slot.timer.abort();
        }
        info!(count = drained.len(), "schedule engine stopped");
        drained.len()
    }
}

impl EngineInner {
    // A poisoned lock means a panic happened mid-insert/remove; the map is
    // still structurally valid.
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<MemberId, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fire(&self, member_id: MemberId, generation: u64) {
        // Claim the slot. Once it is gone from the map, cancel() can no longer
        // reach this fire.
        {
            let mut slots = self.lock_slots();
            if slots.get(&member_id).map(|slot| slot.generation) != Some(generation) {
                debug!(member_id = %member_id, "superseded timer woke, ignoring");
                return;
            }
            slots.remove(&member_id);
        }

        let member = match self.directory.get_member(member_id) {
            Ok(member) => member,
            Err(DirectoryError::MemberNotFound(_)) => {
                debug!(member_id = %member_id, "member left before expiry");
                return;
            }
            Err(e) => {
                warn!(member_id = %member_id, error = %e, "could not load member at fire time, expiry dropped");
                return;
            }
        };

        // The policy may have been disabled since the timer was armed.
        match self.policies.get_policy(member.clan_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(member_id = %member_id, clan_id = %member.clan_id, "reverification disabled for clan, skipping");
                return;
            }
            Err(e) => {
                warn!(member_id = %member_id, error = %e, "could not load policy at fire time, expiry dropped");
                return;
            }
        }

        info!(member_id = %member_id, clan_id = %member.clan_id, "reverification expired");
        if let Err(e) = self.executor.execute(&member).await {
            error!(member_id = %member_id, error = %e, "expiry action failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use chrono::Duration;
    use clanmanager_core::ClanMember;
    use clanmanager_directory::SqliteDirectory;
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};

    const DAY: StdDuration = StdDuration::from_secs(24 * 60 * 60);

    /// Reports every executed member together with the (virtual) time it ran.
    struct RecordingExecutor {
        tx: mpsc::UnboundedSender<(MemberId, Instant)>,
        /// Members whose action never completes.
        stuck: Vec<MemberId>,
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, member: &ClanMember) -> Result<()> {
            let _ = self.tx.send((member.id, Instant::now()));
            if self.stuck.contains(&member.id) {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    struct Fixture {
        dir: Arc<SqliteDirectory>,
        clan: ClanId,
        engine: ScheduleEngine,
        fired: mpsc::UnboundedReceiver<(MemberId, Instant)>,
    }

    fn fixture_with_stuck(stuck: Vec<MemberId>) -> Fixture {
        let dir = Arc::new(SqliteDirectory::open_in_memory().unwrap());
        let clan = dir.create_clan("Ravens", "RVN", "raven").unwrap();
        dir.set_policy(clan, 90).unwrap();
        let (tx, fired) = mpsc::unbounded_channel();
        let engine = ScheduleEngine::new(
            dir.clone(),
            dir.clone(),
            Arc::new(RecordingExecutor { tx, stuck }),
        );
        Fixture {
            dir,
            clan,
            engine,
            fired,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_stuck(Vec::new())
    }

    fn add(fx: &Fixture, discord_user_id: u64) -> MemberId {
        fx.dir
            .add_member(fx.clan, "member", discord_user_id, Utc::now())
            .unwrap()
            .id
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_target_not_earlier() {
        let mut fx = fixture();
        let m = add(&fx, 1);
        let start = Instant::now();

        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(5));
        assert!(fx.engine.is_scheduled(m));

        sleep(DAY * 5 - StdDuration::from_secs(60)).await;
        assert!(fx.fired.try_recv().is_err());

        let (id, at) = fx.fired.recv().await.unwrap();
        assert_eq!(id, m);
        let elapsed = at - start;
        assert!(elapsed > DAY * 5 - StdDuration::from_secs(1));
        assert!(elapsed <= DAY * 5 + StdDuration::from_secs(1));
        assert!(!fx.engine.is_scheduled(m));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_fires_once_at_new_time() {
        let mut fx = fixture();
        let m = add(&fx, 1);
        let start = Instant::now();

        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(1));
        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(3));
        assert_eq!(fx.engine.scheduled_count(), 1);

        let (id, at) = fx.fired.recv().await.unwrap();
        assert_eq!(id, m);
        assert!(at - start > DAY * 3 - StdDuration::from_secs(1));

        sleep(DAY * 10).await;
        assert!(fx.fired.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_timer_that_wakes_does_not_fire() {
        let mut fx = fixture();
        let m = add(&fx, 1);

        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(1));
        let stale = fx.engine.inner.lock_slots()[&m].generation;
        let fire_at = Utc::now() + Duration::days(3);
        fx.engine.schedule(m, fx.clan, fire_at);

        // A timer that woke before the reschedule aborted it.
        fx.engine.inner.fire(m, stale).await;
        assert!(fx.fired.try_recv().is_err());
        assert!(fx.engine.is_scheduled(m));
        assert_eq!(fx.engine.fire_at(m), Some(fire_at));

        let (id, _) = fx.fired.recv().await.unwrap();
        assert_eq!(id, m);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_prevents_it() {
        let mut fx = fixture();
        let m = add(&fx, 1);

        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(1));
        assert!(fx.engine.cancel(m));

        sleep(DAY * 2).await;
        assert!(fx.fired.try_recv().is_err());
        assert_eq!(fx.engine.scheduled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let fx = fixture();
        let m = add(&fx, 1);

        assert!(!fx.engine.cancel(m));
        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(1));
        assert!(fx.engine.cancel(m));
        assert!(!fx.engine.cancel(m));
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_fires_immediately() {
        let mut fx = fixture();
        let m = add(&fx, 1);
        let start = Instant::now();

        fx.engine.schedule(m, fx.clan, Utc::now() - Duration::days(10));

        let (id, at) = fx.fired.recv().await.unwrap();
        assert_eq!(id, m);
        assert!(at - start < StdDuration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_noop() {
        let mut fx = fixture();
        let m = add(&fx, 1);

        fx.engine.schedule(m, fx.clan, Utc::now());
        fx.fired.recv().await.unwrap();
        assert!(!fx.engine.cancel(m));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_policy_at_fire_time_skips_action() {
        let mut fx = fixture();
        let m = add(&fx, 1);

        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(1));
        fx.dir.clear_policy(fx.clan).unwrap();

        sleep(DAY * 2).await;
        assert!(fx.fired.try_recv().is_err());
        assert!(!fx.engine.is_scheduled(m));
    }

    #[tokio::test(start_paused = true)]
    async fn member_gone_at_fire_time_skips_action() {
        let mut fx = fixture();
        let m = add(&fx, 1);

        fx.engine.schedule(m, fx.clan, Utc::now() + Duration::days(1));
        fx.dir.remove_member(m).unwrap();

        sleep(DAY * 2).await;
        assert!(fx.fired.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_action_does_not_block_others() {
        // Row ids start at 1 in a fresh database.
        let mut fx = fixture_with_stuck(vec![MemberId(1)]);
        let stuck = add(&fx, 1);
        let other = add(&fx, 2);
        assert_eq!(stuck, MemberId(1));

        fx.engine.schedule(stuck, fx.clan, Utc::now());
        fx.engine.schedule(other, fx.clan, Utc::now() + Duration::hours(1));

        assert_eq!(fx.fired.recv().await.unwrap().0, stuck);
        // The stuck action is still running; scheduling keeps working.
        let late = add(&fx, 3);
        fx.engine.schedule(late, fx.clan, Utc::now() + Duration::hours(2));
        assert_eq!(fx.fired.recv().await.unwrap().0, other);
        assert_eq!(fx.fired.recv().await.unwrap().0, late);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clan_only_touches_that_clan() {
        let fx = fixture();
        let a = add(&fx, 1);
        let b = add(&fx, 2);
        let other_clan = fx.dir.create_clan("Hawks", "HWK", "hawk").unwrap();
        let c = fx.dir.add_member(other_clan, "c", 3, Utc::now()).unwrap().id;

        let at = Utc::now() + Duration::days(1);
        fx.engine.schedule(a, fx.clan, at);
        fx.engine.schedule(b, fx.clan, at);
        fx.engine.schedule(c, other_clan, at);

        assert_eq!(fx.engine.cancel_clan(fx.clan), 2);
        assert_eq!(fx.engine.snapshot(), vec![(c, at)]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disarms_everything() {
        let mut fx = fixture();
        let a = add(&fx, 1);
        let b = add(&fx, 2);
        fx.engine.schedule(a, fx.clan, Utc::now() + Duration::days(1));
        fx.engine.schedule(b, fx.clan, Utc::now() + Duration::days(2));

        assert_eq!(fx.engine.shutdown(), 2);
        sleep(DAY * 3).await;
        assert!(fx.fired.try_recv().is_err());
    }
}
