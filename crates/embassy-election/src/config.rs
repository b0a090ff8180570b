//! Election configuration management

use crate::error::{ElectionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Delay before the first leader poll after `watch_leader`
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(2);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// File-facing election configuration, durations kept as strings
/// (`"10s"`, `"1m30s"`, `"250ms"`, `"1.5h"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Coordination-service path identifying the election
    pub key: String,

    /// Time between leader-identity polls
    pub poll_interval: String,

    /// Time to wait before retrying a failed lock acquisition
    pub retry_interval: String,

    /// Initial delay before the first leader poll
    #[serde(default = "default_warmup")]
    pub warmup: String,
}

fn default_warmup() -> String {
    "2s".to_string()
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            key: "service/embassy/leader".to_string(),
            poll_interval: "5s".to_string(),
            retry_interval: "10s".to_string(),
            warmup: default_warmup(),
        }
    }
}

impl ElectionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ElectionError::configuration(format!("Failed to read config file: {}", e))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        std::fs::write(path, content).map_err(|e| {
            ElectionError::configuration(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }
}

/// Validated, immutable election settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionSettings {
    key: String,
    poll_interval: Duration,
    retry_interval: Duration,
    warmup: Duration,
}

impl ElectionSettings {
    /// Create settings from already-parsed durations
    pub fn new(
        key: impl Into<String>,
        poll_interval: Duration,
        retry_interval: Duration,
    ) -> Result<Self> {
        let settings = Self {
            key: key.into(),
            poll_interval,
            retry_interval,
            warmup: DEFAULT_WARMUP,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate a file-facing configuration
    pub fn from_config(config: &ElectionConfig) -> Result<Self> {
        let poll_interval = parse_duration(&config.poll_interval)
            .map_err(|e| ElectionError::configuration(format!("poll_interval: {}", e)))?;
        let retry_interval = parse_duration(&config.retry_interval)
            .map_err(|e| ElectionError::configuration(format!("retry_interval: {}", e)))?;
        let warmup = parse_duration(&config.warmup)
            .map_err(|e| ElectionError::configuration(format!("warmup: {}", e)))?;

        Ok(Self::new(config.key.clone(), poll_interval, retry_interval)?.with_warmup(warmup))
    }

    /// Override the delay before the first leader poll
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn warmup(&self) -> Duration {
        self.warmup
    }

    fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(ElectionError::configuration("Election key cannot be empty"));
        }

        if self.poll_interval.is_zero() {
            return Err(ElectionError::configuration(
                "Poll interval must be greater than zero",
            ));
        }

        if self.retry_interval.is_zero() {
            return Err(ElectionError::configuration(
                "Retry interval must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// Parse a duration string made of one or more `<number><unit>` terms.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. Numbers may carry a decimal
/// fraction. A bare `0` is accepted without a unit.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    let invalid = |reason: &str| {
        ElectionError::configuration(format!("invalid duration {:?}: {}", input, reason))
    };

    if s.is_empty() {
        return Err(invalid("empty"));
    }
    if s.starts_with('-') {
        return Err(invalid("negative durations are not allowed"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() {
            return Err(invalid("expected a number"));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("expected a number"));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("malformed number"))?
        };
        let mut term = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| invalid("overflow"))?;

        if !fraction.is_empty() {
            if !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("malformed number"));
            }
            // Precision beyond a nanosecond of an hour is meaningless.
            let digits = &fraction[..fraction.len().min(18)];
            let value: u128 = digits.parse().map_err(|_| invalid("malformed number"))?;
            term = term
                .checked_add(value * unit_nanos / 10u128.pow(digits.len() as u32))
                .ok_or_else(|| invalid("overflow"))?;
        }

        total = total.checked_add(term).ok_or_else(|| invalid("overflow"))?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid("overflow"))?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}
