//! # Config - cache and store settings
//!
//! Settings are layered, later sources winning:
//!
//! 1. built-in defaults,
//! 2. the directive file named by `ATTRSTORE_CONF`, if set,
//! 3. individual environment variables.
//!
//! ## Directive file
//!
//! One `name value` pair per line. Blank lines and lines starting with `#`
//! are ignored; names are case-insensitive.
//!
//! ```text
//! # attrstore.conf
//! cache_size   2000000
//! cache_width  311
//! database     /var/lib/game/attrs.db
//! sync_writes  no
//! ```
//!
//! ## Environment
//!
//! ```text
//! ATTRSTORE_CONF        directive file             (default: none)
//! ATTRSTORE_CACHE_SIZE  cache budget in bytes      (default: 1000000)
//! ATTRSTORE_CACHE_WIDTH hash buckets, 0 = default  (default: 200)
//! ATTRSTORE_DB          store file path            (default: "attrs.db")
//! ATTRSTORE_SYNC        fsync every store write    (default: "true")
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

pub const CONF_VAR: &str = "ATTRSTORE_CONF";

const DEFAULT_CACHE_SIZE: usize = 1_000_000;
const DEFAULT_CACHE_WIDTH: usize = 200;
const DEFAULT_DATABASE: &str = "attrs.db";

/// Directive names paired with the environment variable overriding each.
const SETTINGS: [(&str, &str); 4] = [
    ("cache_size", "ATTRSTORE_CACHE_SIZE"),
    ("cache_width", "ATTRSTORE_CACHE_WIDTH"),
    ("database", "ATTRSTORE_DB"),
    ("sync_writes", "ATTRSTORE_SYNC"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Byte budget for cached values.
    pub cache_size: usize,
    /// Number of hash buckets. Zero selects the cache's default.
    pub cache_width: usize,
    /// Path of the file-backed store.
    pub database: PathBuf,
    /// fsync after every store write.
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            cache_width: DEFAULT_CACHE_WIDTH,
            database: PathBuf::from(DEFAULT_DATABASE),
            sync_writes: true,
        }
    }
}

impl Config {
    /// Builds the configuration from defaults, the `ATTRSTORE_CONF` file and
    /// the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], reading variables through `var` instead of the
    /// process environment.
    pub fn load_with<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = var(CONF_VAR).filter(|p| !p.is_empty()) {
            config.apply_file(&path)?;
        }
        config.apply_vars(var)?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Applies every directive in the file at `path`.
    pub fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        self.apply_directives(&text)
            .with_context(|| format!("in config file {}", path.display()))
    }

    /// Applies directive text. Errors name the offending line.
    pub fn apply_directives(&mut self, text: &str) -> Result<()> {
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = match line.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim()),
                None => (line, ""),
            };
            self.set(&name.to_ascii_lowercase(), value)
                .with_context(|| format!("line {}", n + 1))?;
        }
        Ok(())
    }

    /// Applies whichever override variables `var` knows about.
    pub fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, env) in SETTINGS {
            if let Some(value) = var(env) {
                self.set(name, value.trim())
                    .with_context(|| format!("environment variable {}", env))?;
            }
        }
        Ok(())
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            bail!("missing value for '{}'", name);
        }
        match name {
            "cache_size" => self.cache_size = parse_number(name, value)?,
            "cache_width" => self.cache_width = parse_number(name, value)?,
            "database" => self.database = PathBuf::from(value),
            "sync_writes" => self.sync_writes = parse_flag(name, value)?,
            other => bail!("unknown directive '{}'", other),
        }
        Ok(())
    }
}

fn parse_number(name: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| anyhow!("'{}' expects a non-negative number, got '{}'", name, value))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => bail!("'{}' expects yes or no, got '{}'", name, value),
    }
}
