use std::time::Duration;

use anyhow::{Context, anyhow, bail};

use super::tasks::docker::RegistryCredentials;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the control-plane API
    pub api_base_url: String,
    /// Bearer token sent with every control-plane request
    pub api_access_token: String,
    /// Upper bound on a single control-plane request
    pub api_timeout: Duration,
    /// Credentials for pulling images from a private registry
    pub registry_credentials: Option<RegistryCredentials>,
    pub address: String,
    pub port: u16,
    /// Dispatches that may wait for the worker before the webhook blocks
    pub queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("missing required env var {key}"))
        };

        let registry_credentials = match (lookup("PK_USERNAME"), lookup("PK_PASSWORD")) {
            (Some(username), Some(password)) => Some(RegistryCredentials { username, password }),
            (None, None) => None,
            _ => bail!("PK_USERNAME and PK_PASSWORD must be set together"),
        };

        let api_timeout_secs = env_parse(&lookup, "API_TIMEOUT_SECS", 30u64)?;
        if api_timeout_secs == 0 {
            bail!("API_TIMEOUT_SECS must be greater than zero");
        }

        let queue_capacity = env_parse(&lookup, "DISPATCH_QUEUE_CAPACITY", 64usize)?;
        if queue_capacity == 0 {
            bail!("DISPATCH_QUEUE_CAPACITY must be greater than zero");
        }

        Ok(Config {
            api_base_url: required("API_BASE_URL")?,
            api_access_token: required("API_ACCESS_TOKEN")?,
            api_timeout: Duration::from_secs(api_timeout_secs),
            registry_credentials,
            address: lookup("SERVER_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse(&lookup, "PORT", 8080)?,
            queue_capacity,
        })
    }
}

fn env_parse<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(val) => val
            .parse::<T>()
            .with_context(|| format!("failed to parse env var {key}={val}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_to_optional_settings() {
        let config = config(&[
            ("API_BASE_URL", "http://api.local"),
            ("API_ACCESS_TOKEN", "secret"),
        ])
        .unwrap();

        assert_eq!(config.api_base_url, "http://api.local");
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.api_timeout, Duration::from_secs(30));
        assert!(config.registry_credentials.is_none());
    }

    #[test]
    fn missing_control_plane_settings_fail_fast() {
        let err = config(&[("API_ACCESS_TOKEN", "secret")]).unwrap_err();
        assert!(err.to_string().contains("API_BASE_URL"));

        let err = config(&[("API_BASE_URL", "http://api.local"), ("API_ACCESS_TOKEN", " ")])
            .unwrap_err();
        assert!(err.to_string().contains("API_ACCESS_TOKEN"));
    }

    #[test]
    fn registry_credentials_come_in_pairs() {
        let base = [
            ("API_BASE_URL", "http://api.local"),
            ("API_ACCESS_TOKEN", "secret"),
        ];

        let mut vars = base.to_vec();
        vars.push(("PK_USERNAME", "deployer"));
        assert!(config(&vars).is_err());

        vars.push(("PK_PASSWORD", "hunter2"));
        let credentials = config(&vars).unwrap().registry_credentials.unwrap();
        assert_eq!(credentials.username, "deployer");
        assert_eq!(credentials.password, "hunter2");
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let base = [
            ("API_BASE_URL", "http://api.local"),
            ("API_ACCESS_TOKEN", "secret"),
        ];

        let mut vars = base.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(config(&vars).is_err());

        let mut vars = base.to_vec();
        vars.push(("DISPATCH_QUEUE_CAPACITY", "0"));
        assert!(config(&vars).is_err());

        let mut vars = base.to_vec();
        vars.push(("API_TIMEOUT_SECS", "0"));
        assert!(config(&vars).is_err());
    }
}
