use std::time::Duration;

/// Environment overrides recognized by the agent. Read once at startup so a
/// run sees a consistent view.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub log_level: Option<String>,
    pub config_dir: Option<String>,
    pub http_timeout: Option<Duration>,
    pub dry_run: Option<bool>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        EnvOverrides {
            log_level: lookup("BRIDGE_LOG_LEVEL"),
            config_dir: lookup("BRIDGE_CONFIG_DIR"),
            http_timeout: lookup("BRIDGE_HTTP_TIMEOUT")
                .and_then(|raw| raw.parse::<u64>().ok())
                .map(Duration::from_secs),
            dry_run: lookup("BRIDGE_DRY_RUN").and_then(|raw| match raw.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(vars: &[(&str, &str)]) -> EnvOverrides {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvOverrides::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn parses_every_override() {
        let env = overrides(&[
            ("BRIDGE_LOG_LEVEL", "DEBUG"),
            ("BRIDGE_CONFIG_DIR", "/opt/bridge"),
            ("BRIDGE_HTTP_TIMEOUT", "45"),
            ("BRIDGE_DRY_RUN", "true"),
        ]);

        assert_eq!(env.log_level.as_deref(), Some("DEBUG"));
        assert_eq!(env.config_dir.as_deref(), Some("/opt/bridge"));
        assert_eq!(env.http_timeout, Some(Duration::from_secs(45)));
        assert_eq!(env.dry_run, Some(true));
    }

    #[test]
    fn malformed_values_are_ignored() {
        let env = overrides(&[("BRIDGE_HTTP_TIMEOUT", "soon"), ("BRIDGE_DRY_RUN", "yes")]);
        assert_eq!(env.http_timeout, None);
        assert_eq!(env.dry_run, None);
    }
}
