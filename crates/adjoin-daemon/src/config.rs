use crate::shared::error::{DaemonError, DaemonResult};
use crate::shared::types::{AdCredentials, DEFAULT_ADMIN_USER};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub success_topic: String,
    pub error_topic: String,
    /// How long a publish waits for the broker's acknowledgement
    pub ack_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub ad: AdCredentials,
    pub admin_user: String,
    pub directory_url: String,
    pub directory_timeout: Duration,
    pub remote_shell_program: String,
    pub remote_shell_args: Vec<String>,
    pub remote_shell_timeout: Duration,
    pub mqtt: MqttConfig,
    pub metrics_addr: Option<SocketAddr>,
    pub redelivery_delay: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> DaemonResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                DaemonError::Config(format!("{key} must be set"))
            })
        };
        let parsed = |key: &str| -> DaemonResult<Option<u64>> {
            get(key)
                .map(|value| parse(key, &value))
                .transpose()
        };

        let ad = AdCredentials::new(
            required("AD_DOMAIN")?,
            required("AD_USER")?,
            // passwords may legitimately carry surrounding spaces
            lookup("AD_PASSWORD")
                .filter(|value| !value.is_empty())
                .ok_or_else(|| DaemonError::Config("AD_PASSWORD must be set".to_string()))?,
        );

        let mqtt = MqttConfig {
            host: get("MQTT_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: get("MQTT_PORT")
                .map(|value| parse("MQTT_PORT", &value))
                .transpose()?
                .unwrap_or(1883),
            client_id: get("MQTT_CLIENT_ID").unwrap_or_else(|| "adjoin-daemon".to_string()),
            success_topic: get("SUCCESS_TOPIC")
                .unwrap_or_else(|| "domain-join/succeeded".to_string()),
            error_topic: get("ERROR_TOPIC").unwrap_or_else(|| "domain-join/cleanup".to_string()),
            ack_timeout: Duration::from_secs(parsed("MQTT_ACK_TIMEOUT_SECS")?.unwrap_or(10)),
        };

        Ok(Self {
            ad,
            admin_user: get("WINDOWS_ADMIN_USER").unwrap_or_else(|| DEFAULT_ADMIN_USER.to_string()),
            directory_url: required("INSTANCE_DIRECTORY_URL")?,
            directory_timeout: Duration::from_secs(
                parsed("DIRECTORY_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            remote_shell_program: required("REMOTE_SHELL_PROGRAM")?,
            remote_shell_args: get("REMOTE_SHELL_ARGS")
                .map(|args| args.split_whitespace().map(ToString::to_string).collect())
                .unwrap_or_default(),
            remote_shell_timeout: Duration::from_secs(
                parsed("REMOTE_SHELL_TIMEOUT_SECS")?.unwrap_or(300),
            ),
            mqtt,
            metrics_addr: get("METRICS_ADDR")
                .map(|value| parse("METRICS_ADDR", &value))
                .transpose()?,
            redelivery_delay: Duration::from_secs(
                parsed("REDELIVERY_DELAY_SECS")?.unwrap_or(30),
            ),
        })
    }
}

fn parse<T>(key: &str, value: &str) -> DaemonResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| DaemonError::Config(format!("{key} has invalid value '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("AD_DOMAIN", "CORP"),
            ("AD_USER", "svc_join"),
            ("AD_PASSWORD", "s3cr3t"),
            ("INSTANCE_DIRECTORY_URL", "http://control-plane.internal/api"),
            ("REMOTE_SHELL_PROGRAM", "/usr/local/bin/winrm-bridge"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> DaemonResult<DaemonConfig> {
        DaemonConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.ad, AdCredentials::new("CORP", "svc_join", "s3cr3t"));
        assert_eq!(config.admin_user, "Administrator");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.success_topic, "domain-join/succeeded");
        assert_eq!(config.mqtt.error_topic, "domain-join/cleanup");
        assert_eq!(config.mqtt.ack_timeout, Duration::from_secs(10));
        assert_eq!(config.metrics_addr, None);
        assert_eq!(config.redelivery_delay, Duration::from_secs(30));
        assert_eq!(config.remote_shell_timeout, Duration::from_secs(300));
        assert!(config.remote_shell_args.is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut env = base_env();
        env.insert("WINDOWS_ADMIN_USER", "LocalAdmin");
        env.insert("METRICS_ADDR", "0.0.0.0:9100");
        env.insert("REDELIVERY_DELAY_SECS", "5");
        env.insert("REMOTE_SHELL_ARGS", "--transport ntlm  --insecure");
        env.insert("MQTT_PORT", "8883");
        env.insert("MQTT_ACK_TIMEOUT_SECS", "3");

        let config = load(&env).unwrap();
        assert_eq!(config.admin_user, "LocalAdmin");
        assert_eq!(config.metrics_addr, Some("0.0.0.0:9100".parse().unwrap()));
        assert_eq!(config.redelivery_delay, Duration::from_secs(5));
        assert_eq!(
            config.remote_shell_args,
            vec!["--transport", "ntlm", "--insecure"]
        );
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.ack_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_missing_required_variable_is_named() {
        let mut env = base_env();
        env.remove("AD_USER");
        let err = load(&env).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: AD_USER must be set");

        let mut env = base_env();
        env.insert("INSTANCE_DIRECTORY_URL", "   ");
        let err = load(&env).unwrap_err();
        assert!(err.to_string().contains("INSTANCE_DIRECTORY_URL"));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut env = base_env();
        env.insert("REDELIVERY_DELAY_SECS", "soon");
        let err = load(&env).unwrap_err();
        assert!(err.to_string().contains("REDELIVERY_DELAY_SECS"));

        let mut env = base_env();
        env.insert("METRICS_ADDR", "not-an-addr");
        assert!(load(&env).is_err());
    }

    #[test]
    fn test_debug_does_not_leak_ad_password() {
        let config = load(&base_env()).unwrap();
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }
}
