//! Configuration, and turning it into something the rest of the crate can use.
//!
//! `Config` is what the operator writes (in `t511_ankunft.toml`, or `T511_*`
//! environment variables). Several options accept more than one shape; all of
//! that is sorted out by `Settings::from_raw`, so nothing past this module
//! cares what the config looked like.

use serde_derive::Deserialize;
use t511_util::{ConfigExt, crate_name, user_agent};
use palette::Srgb;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use log::*;

use crate::classify::{Classifier, ColorHandle, Palette};
use crate::errors::ConfigError;
use crate::sources::SourceRegistry;

static DEFAULT_REFRESH_MINS: u64 = 5;
static DEFAULT_BUFFER_SIZE: usize = 1024;
static DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
static DEFAULT_TICK_MS: u64 = 1000;
static DEFAULT_LISTEN: &str = "127.0.0.1:8511";

/// A duration: bare numbers are minutes, strings may carry a unit.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum DurationValue {
    Minutes(u64),
    Text(String),
}

/// A byte count: bare numbers are bytes, strings may carry a unit.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

/// A palette color: `"#rrggbb"`, `"#rgb"`, a CSS color name, or `[r, g, b]`.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ColorValue {
    Rgb([u8; 3]),
    Text(String),
}

/// `t511-ankunft` configuration.
#[derive(Deserialize, Debug, Default)]
pub struct Config {
    /// StopMonitoring URLs to poll, in display order.
    #[serde(default)]
    pub sources: Vec<String>,
    /// How often to poll. Default 5 minutes.
    #[serde(default)]
    pub refresh_interval: Option<DurationValue>,
    /// Largest response accepted per source. Default 1 KiB.
    #[serde(default)]
    pub max_response_buffer_size: Option<SizeValue>,
    /// Named colors that the options below refer to.
    #[serde(default)]
    pub colors: HashMap<String, ColorValue>,
    #[serde(default)]
    pub default_route_color: Option<String>,
    #[serde(default)]
    pub separator_color: Option<String>,
    #[serde(default)]
    pub route_colors: HashMap<String, String>,
    #[serde(default)]
    pub direction_colors: HashMap<String, String>,
    /// Drop arrivals predicted further out than this.
    #[serde(default)]
    pub max_eta: Option<DurationValue>,
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub tick_ms: Option<u64>,
    /// Address for the HTTP endpoint.
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ConfigExt for Config {
    fn crate_name() -> &'static str {
        crate_name!()
    }
}

/// Validated, normalized settings.
#[derive(Clone, Debug)]
pub struct Settings {
    pub sources: SourceRegistry,
    pub refresh_interval: Duration,
    pub max_response_buffer_size: usize,
    pub max_eta: Option<Duration>,
    pub fetch_timeout: Duration,
    pub tick: Duration,
    pub listen: String,
    pub user_agent: String,
    pub palette: Arc<Palette>,
    pub classifier: Arc<Classifier>,
}

impl Settings {
    pub fn from_raw(cfg: Config) -> Result<Self, ConfigError> {
        let sources = SourceRegistry::new(cfg.sources)?;
        let refresh_interval = match cfg.refresh_interval {
            Some(ref v) => parse_minutes("refresh_interval", v)?,
            None => Duration::from_secs(DEFAULT_REFRESH_MINS * 60)
        };
        let max_eta = match cfg.max_eta {
            Some(ref v) => Some(parse_minutes("max_eta", v)?),
            None => None
        };
        let max_response_buffer_size = match cfg.max_response_buffer_size {
            Some(ref v) => parse_size("max_response_buffer_size", v)?,
            None => DEFAULT_BUFFER_SIZE
        };
        let fetch_timeout = cfg.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        if fetch_timeout == 0 {
            return Err(ConfigError::NotPositive("fetch_timeout_secs"));
        }
        let tick_ms = cfg.tick_ms.unwrap_or(DEFAULT_TICK_MS);
        if tick_ms == 0 {
            return Err(ConfigError::NotPositive("tick_ms"));
        }
        let refresh_ms = refresh_interval.as_millis() as u64;
        if refresh_ms < tick_ms {
            return Err(ConfigError::IntervalBelowTick(refresh_ms, tick_ms));
        }

        let mut palette = Palette::new();
        // Sorted, so handles don't depend on hash order.
        let mut names: Vec<_> = cfg.colors.keys().cloned().collect();
        names.sort();
        for name in names {
            let color = parse_color(&name, &cfg.colors[&name])?;
            palette.insert(&name, color);
        }
        let lookup = |field: String, name: &str| -> Result<ColorHandle, ConfigError> {
            palette.lookup(name)
                .ok_or_else(|| ConfigError::UnknownColor { field, name: name.into() })
        };
        let mut classifier = Classifier::default();
        for (route, name) in cfg.route_colors.iter() {
            let h = lookup(format!("route_colors.{}", route), name)?;
            classifier.set_route_color(route, h);
        }
        for (dir, name) in cfg.direction_colors.iter() {
            let h = lookup(format!("direction_colors.{}", dir), name)?;
            classifier.set_direction_color(dir, h);
        }
        if let Some(ref name) = cfg.default_route_color {
            classifier.default_route = Some(lookup("default_route_color".into(), name)?);
        }
        if let Some(ref name) = cfg.separator_color {
            classifier.separator = Some(lookup("separator_color".into(), name)?);
        }

        Ok(Self {
            sources,
            refresh_interval,
            max_response_buffer_size,
            max_eta,
            fetch_timeout: Duration::from_secs(fetch_timeout),
            tick: Duration::from_millis(tick_ms),
            listen: cfg.listen.unwrap_or_else(|| DEFAULT_LISTEN.into()),
            user_agent: cfg.user_agent.unwrap_or_else(|| user_agent!().into()),
            palette: Arc::new(palette),
            classifier: Arc::new(classifier),
        })
    }
    /// Logs the effective configuration.
    pub fn dump(&self) {
        info!("refresh interval: {} min", self.refresh_interval.as_secs() / 60);
        info!("max response buffer size: {} bytes", self.max_response_buffer_size);
        info!("fetch timeout: {} s", self.fetch_timeout.as_secs());
        if let Some(eta) = self.max_eta {
            info!("max ETA: {} min", eta.as_secs() / 60);
        }
        info!("palette: {} color(s)", self.palette.len());
        for src in self.sources.iter() {
            info!("\t{}", src);
        }
    }
}

fn split_unit(s: &str) -> (&str, &str) {
    let s = s.trim();
    let idx = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    (&s[..idx], s[idx..].trim())
}

/// Parses a duration that has to be a positive whole number of minutes.
pub fn parse_minutes(field: &'static str, v: &DurationValue) -> Result<Duration, ConfigError> {
    let invalid = |value: String, reason| ConfigError::InvalidDuration { field, value, reason };
    let ms = match *v {
        DurationValue::Minutes(m) => m.checked_mul(60_000)
            .ok_or_else(|| invalid(m.to_string(), "too large"))?,
        DurationValue::Text(ref s) => {
            let (num, unit) = split_unit(s);
            let n: u64 = num.parse()
                .map_err(|_| invalid(s.clone(), "expected a number"))?;
            let scale = match unit {
                "" | "m" | "min" | "mins" | "minutes" => 60_000,
                "h" | "hours" => 3_600_000,
                "s" | "sec" | "seconds" => 1000,
                "ms" => 1,
                _ => return Err(invalid(s.clone(), "unknown unit"))
            };
            n.checked_mul(scale)
                .ok_or_else(|| invalid(s.clone(), "too large"))?
        }
    };
    let text = || match *v {
        DurationValue::Minutes(m) => m.to_string(),
        DurationValue::Text(ref s) => s.clone()
    };
    if ms == 0 {
        return Err(invalid(text(), "must be positive"));
    }
    if ms % 60_000 != 0 {
        return Err(invalid(text(), "must be a whole number of minutes"));
    }
    Ok(Duration::from_millis(ms))
}

/// Parses a positive byte count.
pub fn parse_size(field: &'static str, v: &SizeValue) -> Result<usize, ConfigError> {
    let bytes = match *v {
        SizeValue::Bytes(b) => Some(b),
        SizeValue::Text(ref s) => {
            let (num, unit) = split_unit(s);
            let scale = match &unit.to_ascii_lowercase() as &str {
                "" | "b" => Some(1),
                "k" | "kb" | "kib" => Some(1024),
                "m" | "mb" | "mib" => Some(1024 * 1024),
                _ => None
            };
            match (num.parse::<u64>().ok(), scale) {
                (Some(n), Some(scale)) => n.checked_mul(scale),
                _ => None
            }
        }
    };
    match bytes {
        Some(b) if b > 0 && b <= usize::MAX as u64 => Ok(b as usize),
        _ => {
            let value = match *v {
                SizeValue::Bytes(b) => b.to_string(),
                SizeValue::Text(ref s) => s.clone()
            };
            Err(ConfigError::InvalidSize { field, value })
        }
    }
}

/// Parses a palette entry.
pub fn parse_color(name: &str, v: &ColorValue) -> Result<Srgb<u8>, ConfigError> {
    match *v {
        ColorValue::Rgb([r, g, b]) => Ok(Srgb::new(r, g, b)),
        ColorValue::Text(ref s) => {
            let s = s.trim();
            let ret = if s.starts_with('#') {
                s.parse::<Srgb<u8>>().ok()
            }
            else {
                palette::named::from_str(&s.to_ascii_lowercase())
            };
            ret.ok_or_else(|| ConfigError::InvalidColor {
                name: name.into(),
                value: s.into()
            })
        }
    }
}
