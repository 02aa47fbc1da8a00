//! Utility functions for all t511 crates.
//!
//! Currently contains:
//!
//! - random macros
//! - logging
//! - config
//! - a tiny HTTP server wrapper

pub mod http;

use config as cfg;
use serde::de::DeserializeOwned;
use log::*;

#[macro_export]
macro_rules! crate_name {
    () => {module_path!().split("::").next().unwrap_or(module_path!())}
}

/// Produces a `User-Agent` string for the calling crate.
#[macro_export]
macro_rules! user_agent {
    () => {concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))}
}

#[macro_export]
macro_rules! impl_from_for_error {
    ($error:ident, $($orig:ident => $var:ident),*) => {
        $(
            impl From<$orig> for $error {
                fn from(err: $orig) -> $error {
                    $error::$var(err)
                }
            }
         )*
    }
}

/// Extension trait for populating crate configuration structs.
///
/// If a struct used for config implements `Deserialize`, this
/// trait can be used to populate it with values from `[crate name].toml`
/// in the current directory, and from `T511_*` environment variables.
///
/// `config` lowercases table keys as it reads them, so anything keyed by
/// user-supplied names has to be compared case-insensitively.
pub trait ConfigExt: DeserializeOwned {
    fn crate_name() -> &'static str;
    fn load() -> Result<Self, failure::Error> {
        let cn = Self::crate_name();
        info!("Loading t511 config for crate {}", cn);
        Self::load_from(cn)
    }
    /// Like `load`, but reads the file at `path` (extension optional).
    fn load_from(path: &str) -> Result<Self, failure::Error> {
        let mut settings = cfg::Config::default();
        if let Err(e) = settings.merge(cfg::File::with_name(path)) {
            warn!("Error loading config from {}: {}", path, e);
            settings = cfg::Config::default();
        }
        let mut s2 = settings.clone();
        if let Err(e) = s2.merge(cfg::Environment::with_prefix("T511")) {
            warn!("Error loading config from env: {}", e);
        }
        else {
            settings = s2;
        }
        let ret = settings.try_into()?;
        Ok(ret)
    }
}

/// Initialize logging.
///
/// Honours `T511_LOG` (`error`, `warn`, `info`, `debug`, `trace`) if set,
/// otherwise logs at `info`.
pub fn setup_logging() -> Result<(), failure::Error> {
    let level = std::env::var("T511_LOG").ok()
        .and_then(|l| l.parse().ok())
        .unwrap_or(log::LevelFilter::Info);
    fern::Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!("[{} {}] {}",
                                    record.target(),
                                    record.level(),
                                    msg))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
