//! Engine configuration.
//!
//! Values come from the environment (a `.env` file is loaded first by the
//! binary through `dotenvy`). Anything unset or unparseable falls back to
//! its default.

use std::str::FromStr;

use crate::api::logs::log_warning;

/// Default bound on the prefix read by content sniffing.
pub const DEFAULT_SNIFF_BYTES: usize = 8 * 1024;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Process-wide engine settings, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// `TABCONV_SNIFF_BYTES`
    pub sniff_bytes: usize,
    /// `TABCONV_CONTENT_SNIFF`
    pub content_sniffing: bool,
    /// `TABCONV_STRICT_KEYS`: reject key-style collisions inline.
    pub strict_keys: bool,
    /// `TABCONV_STRICT_EXPRESSIONS`: malformed filter expressions are errors.
    pub strict_expressions: bool,
    /// `TABCONV_PORT`
    pub port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sniff_bytes: DEFAULT_SNIFF_BYTES,
            content_sniffing: true,
            strict_keys: false,
            strict_expressions: false,
            port: DEFAULT_PORT,
        }
    }
}

impl EngineConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            sniff_bytes: parse_or("TABCONV_SNIFF_BYTES", &lookup, defaults.sniff_bytes)
                .max(64),
            content_sniffing: parse_flag("TABCONV_CONTENT_SNIFF", &lookup, defaults.content_sniffing),
            strict_keys: parse_flag("TABCONV_STRICT_KEYS", &lookup, defaults.strict_keys),
            strict_expressions: parse_flag(
                "TABCONV_STRICT_EXPRESSIONS",
                &lookup,
                defaults.strict_expressions,
            ),
            port: parse_or("TABCONV_PORT", &lookup, defaults.port),
        }
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log_warning(format!("Ignoring invalid {}={:?}", key, raw));
            default
        }),
    }
}

fn parse_flag<F>(key: &str, lookup: &F, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => default,
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                log_warning(format!("Ignoring invalid {}={:?}", key, v));
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> EngineConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), EngineConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("TABCONV_SNIFF_BYTES", "4096"),
            ("TABCONV_CONTENT_SNIFF", "off"),
            ("TABCONV_STRICT_KEYS", "yes"),
            ("TABCONV_PORT", "8080"),
        ]);
        assert_eq!(cfg.sniff_bytes, 4096);
        assert!(!cfg.content_sniffing);
        assert!(cfg.strict_keys);
        assert!(!cfg.strict_expressions);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[("TABCONV_PORT", "http"), ("TABCONV_STRICT_KEYS", "maybe")]);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(!cfg.strict_keys);
    }
}
