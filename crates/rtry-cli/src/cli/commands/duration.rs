//! `rtry duration` – convert duration tokens.

use anyhow::Result;
use rtry_core::duration;

pub fn run_duration_parse(token: &str) -> Result<()> {
    println!("{}", duration::parse_ms(token)?);
    Ok(())
}

pub fn run_duration_format(ms: u64) {
    println!("{}", duration::format_ms(ms));
}
