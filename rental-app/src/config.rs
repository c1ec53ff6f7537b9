//! Configuration loading from environment.

use std::env;
use std::num::NonZeroU64;
use std::time::Duration;

/// One place a setting may come from, in priority order.
#[derive(Debug, Clone, Copy)]
enum Source {
    Env(&'static str),
    Default(&'static str),
}

/// Resolves a setting from the first source that yields a non-empty value.
fn resolve<F>(sources: &[Source], lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    sources.iter().find_map(|source| match source {
        Source::Env(name) => lookup(name).filter(|v| !v.trim().is_empty()),
        Source::Default(value) => Some((*value).to_string()),
    })
}

fn required<F>(sources: &[Source], lookup: &F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    resolve(sources, lookup).ok_or_else(|| {
        let names: Vec<&str> = sources
            .iter()
            .filter_map(|s| match s {
                Source::Env(name) => Some(*name),
                Source::Default(_) => None,
            })
            .collect();
        anyhow::anyhow!("{} environment variable is required", names.join(" or "))
    })
}

fn parsed<T, F>(sources: &[Source], lookup: &F) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = required(sources, lookup)?;
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid value {raw:?}: {e}"))
}

const PORT: &[Source] = &[Source::Env("PORT"), Source::Default("3000")];
const DATABASE_URL: &[Source] = &[Source::Env("DATABASE_URL")];
const SECRET_KEY: &[Source] = &[
    Source::Env("PROVIDER_SECRET_KEY"),
    Source::Env("STRIPE_SECRET_KEY"),
];
const WEBHOOK_SECRET: &[Source] = &[
    Source::Env("PROVIDER_WEBHOOK_SECRET"),
    Source::Env("STRIPE_WEBHOOK_SECRET"),
];
const API_BASE: &[Source] = &[
    Source::Env("PROVIDER_API_BASE"),
    Source::Default("https://api.stripe.com"),
];
const TIMEOUT_MS: &[Source] = &[
    Source::Env("PROVIDER_TIMEOUT_MS"),
    Source::Default("10000"),
];
const API_KEY: &[Source] = &[Source::Env("API_KEY")];
const SWEEP_INTERVAL_SECS: &[Source] = &[
    Source::Env("EXPIRY_SWEEP_INTERVAL_SECS"),
    Source::Default("900"),
];
const NOTIFIER_URL: &[Source] = &[Source::Env("NOTIFIER_URL")];
const NOTIFIER_SECRET: &[Source] = &[Source::Env("NOTIFIER_SECRET")];
const RATE_LIMIT: &[Source] = &[
    Source::Env("RATE_LIMIT_PER_MINUTE"),
    Source::Default("100"),
];
const PUBLIC_BASE_URL: &[Source] = &[
    Source::Env("PUBLIC_BASE_URL"),
    Source::Default("http://localhost:3000"),
];

/// Where domain events are pushed, when configured.
pub struct NotifierSettings {
    pub url: String,
    pub secret: String,
}

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub provider_secret_key: String,
    pub webhook_secret: String,
    pub provider_api_base: String,
    pub provider_timeout: Duration,
    pub api_key: String,
    pub expiry_sweep_interval: Duration,
    pub notifier: Option<NotifierSettings>,
    pub rate_limit_per_minute: u32,
    pub public_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let notifier = match (
            resolve(NOTIFIER_URL, &lookup),
            resolve(NOTIFIER_SECRET, &lookup),
        ) {
            (Some(url), Some(secret)) => Some(NotifierSettings { url, secret }),
            (Some(_), None) => anyhow::bail!("NOTIFIER_URL is set but NOTIFIER_SECRET is missing"),
            _ => None,
        };

        Ok(Self {
            port: parsed(PORT, &lookup)?,
            database_url: required(DATABASE_URL, &lookup)?,
            provider_secret_key: required(SECRET_KEY, &lookup)?,
            webhook_secret: required(WEBHOOK_SECRET, &lookup)?,
            provider_api_base: required(API_BASE, &lookup)?,
            provider_timeout: Duration::from_millis(
                parsed::<NonZeroU64, _>(TIMEOUT_MS, &lookup)?.get(),
            ),
            api_key: required(API_KEY, &lookup)?,
            expiry_sweep_interval: Duration::from_secs(
                parsed::<NonZeroU64, _>(SWEEP_INTERVAL_SECS, &lookup)?.get(),
            ),
            notifier,
            rate_limit_per_minute: parsed(RATE_LIMIT, &lookup)?,
            public_base_url: required(PUBLIC_BASE_URL, &lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DATABASE_URL", "sqlite::memory:"),
        ("PROVIDER_SECRET_KEY", "sk_primary"),
        ("PROVIDER_WEBHOOK_SECRET", "whsec_primary"),
        ("API_KEY", "staff"),
    ];

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.provider_timeout, Duration::from_millis(10_000));
        assert_eq!(config.expiry_sweep_interval, Duration::from_secs(900));
        assert_eq!(config.rate_limit_per_minute, 100);
        assert!(config.notifier.is_none());
    }

    #[test]
    fn test_primary_name_wins_over_legacy() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("STRIPE_SECRET_KEY", "sk_legacy"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.provider_secret_key, "sk_primary");
    }

    #[test]
    fn test_legacy_name_is_accepted() {
        let vars = [
            ("DATABASE_URL", "sqlite::memory:"),
            ("STRIPE_SECRET_KEY", "sk_legacy"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_legacy"),
            ("API_KEY", "staff"),
        ];
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.provider_secret_key, "sk_legacy");
        assert_eq!(config.webhook_secret, "whsec_legacy");
    }

    #[test]
    fn test_blank_primary_falls_through() {
        let mut vars = MINIMAL.to_vec();
        vars.retain(|(k, _)| *k != "PROVIDER_SECRET_KEY");
        vars.push(("PROVIDER_SECRET_KEY", "  "));
        vars.push(("STRIPE_SECRET_KEY", "sk_legacy"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.provider_secret_key, "sk_legacy");
    }

    #[test]
    fn test_missing_secret_names_both_variables() {
        let vars = [("DATABASE_URL", "sqlite::memory:"), ("API_KEY", "staff")];
        let err = Config::from_lookup(lookup(&vars)).err().unwrap();
        assert!(err.to_string().contains("PROVIDER_SECRET_KEY or STRIPE_SECRET_KEY"));
    }

    #[test]
    fn test_notifier_requires_secret() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("NOTIFIER_URL", "https://hooks.example/"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());

        vars.push(("NOTIFIER_SECRET", "nsec"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.notifier.unwrap().url, "https://hooks.example/");
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        for name in ["EXPIRY_SWEEP_INTERVAL_SECS", "PROVIDER_TIMEOUT_MS"] {
            let mut vars = MINIMAL.to_vec();
            vars.push((name, "0"));
            let err = Config::from_lookup(lookup(&vars)).err().unwrap();
            assert!(err.to_string().contains("\"0\""), "{name}: {err}");
        }
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }
}
