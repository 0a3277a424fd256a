use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::{tokens, Classifier, MethodStatus, RateLimitBackoff};
use crate::duration;
use crate::error::ConfigError;
use crate::hedge::HedgeSpec;
use crate::jitter::{Jitter, JitterMode};
use crate::policy::{BackoffMode, OnTokens, Policy, DEFAULT_ATTEMPTS};
use crate::sequence::Sequence;

/// Name of the policy used when none is requested.
pub const DEFAULT_PROFILE: &str = "default";
/// Written alongside the default profile: retries only transient failures.
pub const TRANSIENT_PROFILE: &str = "transient";

/// A duration in milliseconds; reads either a token (`"1.5s"`) or a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationMs(pub u64);

impl Serialize for DurationMs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&duration::format_ms(self.0))
    }
}

impl<'de> Deserialize<'de> for DurationMs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Token(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(DurationMs(ms)),
            Raw::Token(t) => duration::parse_ms(&t)
                .map(DurationMs)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// One entry of an `on` list: a status code or a token name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnToken {
    Status(u16),
    Name(String),
}

impl fmt::Display for OnToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnToken::Status(code) => write!(f, "{code}"),
            OnToken::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub delays: Vec<DurationMs>,
    #[serde(default)]
    pub repeat_last: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Absolute window. Mutually exclusive with `percent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<DurationMs>,
    /// Window as a percentage of the delay being jittered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// "full" (default) or "pm".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeConfig {
    pub lanes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stagger: Option<DurationMs>,
    /// 1 = cancel remaining lanes on first success (default), 2 = wait for all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<u32>,
}

/// One `[policies.<name>]` table. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Total attempts including the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// Advisory per-attempt timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<DurationMs>,
    /// Wall-clock budget for the whole run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DurationMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_after: Option<DurationMs>,
    /// linear | exponential | sequence (or lin | exp | seq). Inferred when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<f64>,
    /// Linear increment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DurationMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<DurationMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_headers: Option<bool>,
    /// Retry only on these statuses/tags. Absent means retry every failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Vec<OnToken>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<JitterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hedge: Option<HedgeConfig>,
}

impl PolicyConfig {
    /// Build a ready-to-run [`Policy`].
    pub fn build(&self) -> std::result::Result<Policy, ConfigError> {
        let mode = match &self.mode {
            Some(m) => m.parse::<BackoffMode>()?,
            None if self.sequence.is_some() => BackoffMode::Sequence,
            None if self.delay.is_some() => BackoffMode::Linear,
            None => BackoffMode::Exponential,
        };

        let mut policy = Policy::new()
            .with_attempts(self.attempts.unwrap_or(DEFAULT_ATTEMPTS))
            .with_attempt_timeout_ms(self.timeout.map(|d| d.0))
            .with_deadline_budget_ms(self.deadline.map(|d| d.0))
            .with_start_after_ms(self.start_after.map_or(0, |d| d.0))
            .with_follow_headers(self.follow_headers.unwrap_or(true))
            .with_cap_ms(self.cap.map(|d| d.0))
            .with_seed(self.seed);

        if let Some(base) = self.base {
            policy = policy.with_exponential_base(base);
        }
        if let Some(delay) = self.delay {
            policy = policy.with_delay_ms(delay.0);
        }
        if let Some(seq) = &self.sequence {
            if seq.delays.is_empty() {
                return Err(ConfigError::EmptySequence);
            }
            let delays = seq.delays.iter().map(|d| d.0).collect();
            policy = policy.with_sequence(Sequence::new(delays, seq.repeat_last));
        }
        // Setters above switch modes as a side effect; the resolved mode wins.
        policy = policy.with_mode(mode);

        if let Some(j) = &self.jitter {
            let jitter_mode = match &j.mode {
                Some(m) => m.parse::<JitterMode>()?,
                None => JitterMode::default(),
            };
            policy = policy.with_jitter(Jitter::new(j.window.map(|d| d.0), j.percent, jitter_mode)?);
        }
        if let Some(h) = &self.hedge {
            policy = policy.with_hedge(HedgeSpec::new(
                h.lanes,
                h.stagger.map_or(0, |d| d.0),
                h.cancel,
            )?);
        }

        let mut classifier = Classifier::new().with_rule(MethodStatus::default());
        if let Some(on) = &self.on {
            let raw: Vec<String> = on.iter().map(ToString::to_string).collect();
            let decider = OnTokens::parse(&raw);
            let wants_rate_limit = decider
                .tokens()
                .iter()
                .any(|t| tokens::is_rate_limit_token(&t.to_string()));
            if wants_rate_limit && !classifier.has_rule::<RateLimitBackoff>() {
                classifier.add_rule(RateLimitBackoff);
            }
            policy = policy.with_decider(decider);
        }
        Ok(policy.with_classifier(classifier))
    }
}

/// Configuration loaded from `~/.config/rtry/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtryConfig {
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl Default for RtryConfig {
    /// `default` retries every failure; `transient` only the default token set.
    fn default() -> Self {
        let default_policy = PolicyConfig {
            attempts: Some(DEFAULT_ATTEMPTS),
            delay: Some(DurationMs(250)),
            cap: Some(DurationMs(30_000)),
            jitter: Some(JitterConfig {
                percent: Some(20.0),
                mode: Some(JitterMode::PlusMinus.to_string()),
                ..JitterConfig::default()
            }),
            ..PolicyConfig::default()
        };
        let transient_policy = PolicyConfig {
            on: Some(vec![OnToken::Name("default".to_string())]),
            ..default_policy.clone()
        };
        Self {
            policies: BTreeMap::from([
                (DEFAULT_PROFILE.to_string(), default_policy),
                (TRANSIENT_PROFILE.to_string(), transient_policy),
            ]),
        }
    }
}

impl RtryConfig {
    /// Build the named policy.
    pub fn profile(&self, name: &str) -> std::result::Result<Policy, ConfigError> {
        self.policies
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?
            .build()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rtry")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RtryConfig> {
    let path = config_path()?;
    init_at(&path)
}

/// Like [`load_or_init`] for an explicit path.
pub fn init_at(path: &Path) -> Result<RtryConfig> {
    if !path.exists() {
        let default_cfg = RtryConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(path)
}

pub fn load_from_path(path: &Path) -> Result<RtryConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: RtryConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Context, OperationError};
    use crate::policy::Token;
    use crate::retry::{AttemptContext, AttemptOutcome};
    use tempfile::tempdir;

    #[test]
    fn default_config_has_default_profile() {
        let cfg = RtryConfig::default();
        let policy = cfg.profile(DEFAULT_PROFILE).unwrap();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.mode(), BackoffMode::Linear);
        assert_eq!(policy.cap_ms(), Some(30_000));
        assert!(!policy.classifier().unwrap().has_rule::<RateLimitBackoff>());
        let transient = cfg.profile(TRANSIENT_PROFILE).unwrap();
        assert!(transient.classifier().unwrap().has_rule::<RateLimitBackoff>());
    }

    #[test]
    fn default_profile_retries_plain_failures_transient_does_not() {
        let cfg = RtryConfig::default();
        let plain = OperationError::new("`make` exited with status 1").with_code(1);
        let ctx = AttemptContext::new(1, 3, 0, 0, None, Context::new());

        let default = cfg.profile(DEFAULT_PROFILE).unwrap();
        let meta = default.classifier().unwrap().classify(&plain);
        let outcome = AttemptOutcome::failure(&plain, meta.status_code, &meta.tags);
        assert!(default.decider().should_retry(&outcome, &ctx));

        let transient = cfg.profile(TRANSIENT_PROFILE).unwrap();
        let meta = transient.classifier().unwrap().classify(&plain);
        let outcome = AttemptOutcome::failure(&plain, meta.status_code, &meta.tags);
        assert!(!transient.decider().should_retry(&outcome, &ctx));

        let reset = OperationError::new("connection reset by peer");
        let meta = transient.classifier().unwrap().classify(&reset);
        let outcome = AttemptOutcome::failure(&reset, meta.status_code, &meta.tags);
        assert!(transient.decider().should_retry(&outcome, &ctx));
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = RtryConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RtryConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn durations_accept_tokens_and_integers() {
        let toml = r#"
            [policies.api]
            attempts = 5
            timeout = "2s"
            deadline = 1500
            start_after = "0.5s"
            base = 3.0
            cap = "1m"
        "#;
        let cfg: RtryConfig = toml::from_str(toml).unwrap();
        let p = cfg.profile("api").unwrap();
        assert_eq!(p.attempts(), 5);
        assert_eq!(p.attempt_timeout_ms(), Some(2_000));
        assert_eq!(p.deadline_budget_ms(), Some(1_500));
        assert_eq!(p.start_after_ms(), 500);
        assert_eq!(p.mode(), BackoffMode::Exponential);
        assert_eq!(p.exponential_base(), 3.0);
        assert_eq!(p.cap_ms(), Some(60_000));

        let bad = r#"
            [policies.x]
            delay = "fast"
        "#;
        assert!(toml::from_str::<RtryConfig>(bad).is_err());
    }

    #[test]
    fn mode_is_inferred_and_explicit_mode_wins() {
        let toml = r#"
            [policies.seq]
            sequence = { delays = ["50", 100, "1.5s"], repeat_last = true }

            [policies.lin]
            delay = "100ms"

            [policies.forced]
            delay = "100ms"
            mode = "exp"
        "#;
        let cfg: RtryConfig = toml::from_str(toml).unwrap();
        let seq = cfg.profile("seq").unwrap();
        assert_eq!(seq.mode(), BackoffMode::Sequence);
        assert_eq!(seq.next_delay_ms(Some(3)), 1_500);
        assert_eq!(seq.next_delay_ms(Some(9)), 1_500);
        assert_eq!(cfg.profile("lin").unwrap().mode(), BackoffMode::Linear);
        assert_eq!(cfg.profile("forced").unwrap().mode(), BackoffMode::Exponential);
    }

    #[test]
    fn on_tokens_install_decider_and_rate_limit_rule() {
        let toml = r#"
            [policies.strict]
            on = [503, "ETIMEDOUT"]

            [policies.throttled]
            on = ["429"]
        "#;
        let cfg: RtryConfig = toml::from_str(toml).unwrap();
        let strict = cfg.profile("strict").unwrap();
        assert!(!strict.classifier().unwrap().has_rule::<RateLimitBackoff>());
        assert!(strict.classifier().unwrap().has_rule::<MethodStatus>());
        let throttled = cfg.profile("throttled").unwrap();
        assert_eq!(throttled.classifier().unwrap().rule_count(), 2);
        assert!(throttled.classifier().unwrap().has_rule::<RateLimitBackoff>());
        assert_eq!(OnTokens::parse(&["429"]).tokens(), [Token::Status(429)]);
    }

    #[test]
    fn invalid_parts_are_config_errors() {
        let both = PolicyConfig {
            jitter: Some(JitterConfig {
                window: Some(DurationMs(100)),
                percent: Some(10.0),
                mode: None,
            }),
            ..PolicyConfig::default()
        };
        assert_eq!(both.build().unwrap_err(), ConfigError::JitterWindowAndPercent);

        let no_lanes = PolicyConfig {
            hedge: Some(HedgeConfig {
                lanes: 0,
                stagger: None,
                cancel: None,
            }),
            ..PolicyConfig::default()
        };
        assert_eq!(no_lanes.build().unwrap_err(), ConfigError::HedgeLanes(0));

        let empty_seq = PolicyConfig {
            sequence: Some(SequenceConfig {
                delays: vec![],
                repeat_last: false,
            }),
            ..PolicyConfig::default()
        };
        assert_eq!(empty_seq.build().unwrap_err(), ConfigError::EmptySequence);

        let bad_mode = PolicyConfig {
            mode: Some("fibonacci".into()),
            ..PolicyConfig::default()
        };
        assert!(matches!(bad_mode.build(), Err(ConfigError::UnknownMode(_))));

        assert_eq!(
            RtryConfig::default().profile("nope").unwrap_err(),
            ConfigError::UnknownProfile("nope".into())
        );
    }

    #[test]
    fn init_at_creates_then_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let created = init_at(&path).unwrap();
        assert!(path.exists());
        let loaded = init_at(&path).unwrap();
        assert_eq!(created, loaded);

        fs::write(&path, "[policies.only]\nattempts = 7\n").unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.profile("only").unwrap().attempts(), 7);
        assert!(cfg.profile(DEFAULT_PROFILE).is_err());
    }
}
