use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use clanmanager_core::{ClanMember, ExpiryPolicy};
use tokio::time::Instant;

/// Longest single sleep. tokio's timer wheel tops out at roughly two years,
/// and intervals may be much longer than that.
const MAX_SLEEP: StdDuration = StdDuration::from_secs(365 * 24 * 60 * 60);

/// Instant at which `member` expires under `policy`.
pub fn compute_fire_at(member: &ClanMember, policy: &ExpiryPolicy) -> DateTime<Utc> {
    policy.expires_at(member.verified_at)
}

/// Time left until `fire_at`, measured from `now`. Zero when already due.
pub fn delay_until(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> StdDuration {
    (fire_at - now).to_std().unwrap_or(StdDuration::ZERO)
}

/// Sleep until `fire_at`. `delay` is the wait measured when the timer was
/// armed. Every chunk is also re-measured against the wall clock, so time the
/// host spent suspended (or a forward clock step) shortens the remaining wait
/// instead of being slept through.
pub(crate) async fn sleep_until(fire_at: DateTime<Utc>, delay: StdDuration) {
    let start = Instant::now();
    loop {
        let remaining = delay
            .saturating_sub(start.elapsed())
            .min(delay_until(fire_at, Utc::now()));
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
    }
}
