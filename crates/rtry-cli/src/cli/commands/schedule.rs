//! `rtry schedule` – show the delays a profile would produce.

use anyhow::Result;
use rtry_core::config;
use rtry_core::duration::format_ms;
use rtry_core::Policy;

/// (attempt, delay before it). Attempt 1 waits the start-after delay.
pub fn schedule_rows(policy: &Policy) -> Vec<(u32, u64)> {
    let mut rows = vec![(1, policy.start_after_ms())];
    rows.extend((2..=policy.attempts()).map(|n| (n, policy.next_delay_ms(Some(n)))));
    rows
}

pub fn run_schedule(profile: &str) -> Result<()> {
    let cfg = config::load_or_init()?;
    let policy = cfg.profile(profile)?;
    tracing::debug!(profile, "printing schedule");

    println!("profile: {profile}  mode: {}", policy.mode());
    if let Some(seq) = policy.sequence() {
        println!("sequence: {seq}");
    }
    if let Some(jitter) = policy.jitter() {
        println!("jitter: {jitter}");
    }
    if let Some(cap) = policy.cap_ms() {
        println!("cap: {}", format_ms(cap));
    }
    if let Some(deadline) = policy.deadline_budget_ms() {
        println!("deadline: {}", format_ms(deadline));
    }
    if let Some(hedge) = policy.hedge() {
        println!("hedge: {hedge}");
    }

    println!("{:<8} {}", "ATTEMPT", "DELAY");
    for (attempt, delay) in schedule_rows(&policy) {
        println!("{:<8} {}", attempt, format_ms(delay));
    }
    Ok(())
}
