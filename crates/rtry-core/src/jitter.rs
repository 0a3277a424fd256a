//! Jitter: perturb a nominal delay, randomly or deterministically from a seed.

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::duration;
use crate::error::ConfigError;

/// Key mixed into the seeded hash so jitter draws never collide with other seeded users.
const JITTER_KEY: &str = "j";

/// How the jitter window is applied to the nominal delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMode {
    /// Replace the delay with a draw from `[0, window]`.
    #[default]
    Full,
    /// Shift the delay by a draw from `[-window, window]`, clamped at 0.
    PlusMinus,
}

impl JitterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JitterMode::Full => "full",
            JitterMode::PlusMinus => "pm",
        }
    }
}

impl fmt::Display for JitterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JitterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(JitterMode::Full),
            "pm" => Ok(JitterMode::PlusMinus),
            _ => Err(ConfigError::JitterMode(s.to_string())),
        }
    }
}

/// Jitter window, either absolute or relative to the delay being jittered.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Window {
    Millis(u64),
    Percent(f64),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Jitter {
    window: Window,
    mode: JitterMode,
}

impl Jitter {
    /// Build from an optional absolute window and an optional percentage.
    /// Supplying both is a configuration error.
    pub fn new(
        window_ms: Option<u64>,
        percent: Option<f64>,
        mode: JitterMode,
    ) -> Result<Self, ConfigError> {
        let window = match (window_ms, percent) {
            (Some(_), Some(_)) => return Err(ConfigError::JitterWindowAndPercent),
            (Some(ms), None) => Window::Millis(ms),
            (None, Some(p)) => {
                if !p.is_finite() || !(0.0..=100.0).contains(&p) {
                    return Err(ConfigError::JitterPercentOutOfRange(p));
                }
                Window::Percent(p)
            }
            (None, None) => Window::None,
        };
        Ok(Self { window, mode })
    }

    pub fn window(window_ms: u64, mode: JitterMode) -> Self {
        Self {
            window: Window::Millis(window_ms),
            mode,
        }
    }

    pub fn percent(percent: f64, mode: JitterMode) -> Result<Self, ConfigError> {
        Self::new(None, Some(percent), mode)
    }

    pub fn mode(&self) -> JitterMode {
        self.mode
    }

    pub fn window_ms(&self) -> Option<u64> {
        match self.window {
            Window::Millis(ms) => Some(ms),
            _ => None,
        }
    }

    pub fn percent_value(&self) -> Option<f64> {
        match self.window {
            Window::Percent(p) => Some(p),
            _ => None,
        }
    }

    /// Apply jitter to `nominal_ms`.
    ///
    /// With a seed the draw is a pure function of `(seed, nominal, mode)`;
    /// without one it comes from the OS random source.
    pub fn apply(&self, nominal_ms: u64, seed: Option<u64>) -> u64 {
        if nominal_ms == 0 {
            return 0;
        }

        let window = match self.window {
            Window::Millis(ms) => ms,
            Window::Percent(p) => ((p / 100.0) * nominal_ms as f64).round() as u64,
            Window::None => 0,
        };
        if window == 0 {
            return match self.mode {
                JitterMode::PlusMinus => nominal_ms,
                JitterMode::Full => 0,
            };
        }

        let window = i128::from(window);
        match self.mode {
            JitterMode::PlusMinus => {
                let delta = self.draw(-window, window, seed, nominal_ms);
                clamp_to_u64(i128::from(nominal_ms) + delta)
            }
            JitterMode::Full => clamp_to_u64(self.draw(0, window, seed, nominal_ms)),
        }
    }

    /// Uniform integer in `[min, max]`.
    fn draw(&self, min: i128, max: i128, seed: Option<u64>, mix: u64) -> i128 {
        if max <= min {
            return min;
        }
        match seed {
            Some(seed) => {
                let frac = seeded_fraction(seed, mix, self.mode);
                min + ((max - min + 1) as f64 * frac).floor() as i128
            }
            None => random_rng().gen_range(min..=max),
        }
    }
}

impl fmt::Display for Jitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.window {
            Window::Millis(ms) => f.write_str(&duration::format_ms(ms))?,
            Window::Percent(p) => f.write_str(&duration::format_percent(p))?,
            Window::None => f.write_str("0")?,
        }
        if self.mode == JitterMode::PlusMinus {
            f.write_str("@pm")?;
        }
        Ok(())
    }
}

/// Stable hash of the draw inputs reduced to six decimal digits in `[0, 1)`.
fn seeded_fraction(seed: u64, mix: u64, mode: JitterMode) -> f64 {
    let digest = Sha256::digest(format!("{seed}:{mix}:{JITTER_KEY}:{mode}").as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % 1_000_000) as f64 / 1_000_000.0
}

/// OS-seeded CSPRNG; falls back to a clock-seeded generator when the OS source fails.
fn random_rng() -> StdRng {
    StdRng::from_rng(OsRng).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "OS random source unavailable; using clock-seeded jitter");
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        StdRng::seed_from_u64(nanos)
    })
}

fn clamp_to_u64(v: i128) -> u64 {
    v.clamp(0, i128::from(u64::MAX)) as u64
}
