pub mod interpretation;
pub mod netdom;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A domain-join request as delivered by the queue.
///
/// Required fields are validated once when the request is built. The original
/// payload is kept untouched so that forwarding and publishing re-emit every
/// field, including ones this crate knows nothing about.
#[derive(Clone, PartialEq)]
pub struct JoinRequest {
    instance_id: String,
    instance_name: String,
    domain: String,
    private_ip: String,
    windows_admin_password: String,
    ad_ou: Option<String>,
    payload: Map<String, Value>,
}

impl JoinRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| CoreError::SerializationError(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(payload) = value else {
            return Err(CoreError::InvalidRequest(
                "request payload must be a JSON object".to_string(),
            ));
        };

        let ad_ou = match payload.get("ad_ou") {
            None | Some(Value::Null) => None,
            Some(Value::String(ou)) if ou.trim().is_empty() => None,
            Some(Value::String(ou)) => Some(ou.clone()),
            Some(_) => {
                return Err(CoreError::InvalidRequest(
                    "field 'ad_ou' must be a string".to_string(),
                ))
            }
        };

        Ok(Self {
            instance_id: required_field(&payload, "instance_id")?,
            instance_name: required_field(&payload, "instance_name")?,
            domain: required_field(&payload, "domain")?,
            private_ip: required_field(&payload, "private_ip")?,
            windows_admin_password: required_field(&payload, "windows_admin_password")?,
            ad_ou,
            payload,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn private_ip(&self) -> &str {
        &self.private_ip
    }

    pub fn windows_admin_password(&self) -> &str {
        &self.windows_admin_password
    }

    pub fn ad_ou(&self) -> Option<&str> {
        self.ad_ou.as_deref()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.payload)
            .map_err(|e| CoreError::SerializationError(e.to_string()))
    }
}

fn required_field(payload: &Map<String, Value>, name: &str) -> Result<String> {
    match payload.get(name) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => Err(CoreError::InvalidRequest(format!(
            "field '{name}' must not be blank"
        ))),
        Some(_) => Err(CoreError::InvalidRequest(format!(
            "field '{name}' must be a string"
        ))),
        None => Err(CoreError::InvalidRequest(format!(
            "missing required field '{name}'"
        ))),
    }
}

impl fmt::Debug for JoinRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinRequest")
            .field("instance_id", &self.instance_id)
            .field("instance_name", &self.instance_name)
            .field("domain", &self.domain)
            .field("private_ip", &self.private_ip)
            .field("windows_admin_password", &"<redacted>")
            .field("ad_ou", &self.ad_ou)
            .finish_non_exhaustive()
    }
}

impl Serialize for JoinRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JoinRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Platform {
    Windows,
    /// Anything else, including an absent platform (Linux images report none).
    #[default]
    Other,
}

impl Platform {
    /// Only the exact label `windows` names a Windows instance.
    pub fn parse(label: &str) -> Self {
        if label == "windows" {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}

impl From<Option<String>> for Platform {
    fn from(label: Option<String>) -> Self {
        label.as_deref().map(Platform::parse).unwrap_or_default()
    }
}

impl From<Platform> for Option<String> {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Some("windows".to_string()),
            Platform::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    pub fn is_terminated(self) -> bool {
        matches!(self, LifecycleState::Terminated)
    }
}

/// Control-plane view of an instance, fetched fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub id: String,
    #[serde(default)]
    pub platform: Platform,
    #[serde(alias = "state")]
    pub lifecycle_state: LifecycleState,
}

impl InstanceDescriptor {
    pub fn new(
        id: impl Into<String>,
        platform: Platform,
        lifecycle_state: LifecycleState,
    ) -> Self {
        Self {
            id: id.into(),
            platform,
            lifecycle_state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub host: String,
    pub line: String,
}

/// Output of one command batch over one session, in the order it was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    lines: Vec<OutputLine>,
}

impl CommandResult {
    pub fn new(lines: Vec<OutputLine>) -> Self {
        Self { lines }
    }

    pub fn from_lines<I, S>(host: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines
                .into_iter()
                .map(|line| OutputLine {
                    host: host.to_string(),
                    line: line.into(),
                })
                .collect(),
        }
    }

    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|output| output.line.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn joined(&self, separator: &str) -> String {
        self.texts().collect::<Vec<_>>().join(separator)
    }
}

/// What the surrounding queue runtime should do with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handling is final; remove the message.
    Ack,
    /// Deliver the same message again later.
    Redeliver,
    /// The payload can never be handled; drop it.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    ForwardedNonWindows,
    ResolutionFailed,
    Joined,
    AlreadyJoined,
    JoinFailed,
    RenamedAwaitingRetry,
    RenameFailed,
}

impl JoinOutcome {
    pub fn disposition(self) -> Disposition {
        match self {
            JoinOutcome::ForwardedNonWindows
            | JoinOutcome::ResolutionFailed
            | JoinOutcome::Joined
            | JoinOutcome::AlreadyJoined => Disposition::Ack,
            JoinOutcome::JoinFailed
            | JoinOutcome::RenamedAwaitingRetry
            | JoinOutcome::RenameFailed => Disposition::Redeliver,
        }
    }

    pub fn is_retryable(self) -> bool {
        self.disposition() == Disposition::Redeliver
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JoinOutcome::ForwardedNonWindows => "forwarded_non_windows",
            JoinOutcome::ResolutionFailed => "resolution_failed",
            JoinOutcome::Joined => "joined",
            JoinOutcome::AlreadyJoined => "already_joined",
            JoinOutcome::JoinFailed => "join_failed",
            JoinOutcome::RenamedAwaitingRetry => "renamed_awaiting_retry",
            JoinOutcome::RenameFailed => "rename_failed",
        }
    }
}

impl fmt::Display for JoinOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed AD service account used for join and rename operations.
#[derive(Clone, PartialEq, Eq)]
pub struct AdCredentials {
    pub domain: String,
    pub user: String,
    pub password: String,
}

impl AdCredentials {
    pub fn new(
        domain: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// `DOMAIN\user` form expected by `/UserD:`.
    pub fn account(&self) -> String {
        format!("{}\\{}", self.domain, self.user)
    }
}

impl fmt::Debug for AdCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdCredentials")
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_payload() -> Value {
        json!({
            "pantry_request_id": 45,
            "instance_name": "myhostname",
            "domain": "mydomain.tld",
            "ami": "ami-hexidstr",
            "security_group_ids": ["sg-01234567", "sg-89abcdef"],
            "instance_id": "i-0123abcd",
            "private_ip": "10.1.1.100",
            "windows_admin_password": "Strong Password"
        })
    }

    #[test]
    fn test_join_request_from_value() {
        let request = JoinRequest::from_value(request_payload()).unwrap();
        assert_eq!(request.instance_id(), "i-0123abcd");
        assert_eq!(request.instance_name(), "myhostname");
        assert_eq!(request.domain(), "mydomain.tld");
        assert_eq!(request.private_ip(), "10.1.1.100");
        assert_eq!(request.windows_admin_password(), "Strong Password");
        assert_eq!(request.ad_ou(), None);
    }

    #[test]
    fn test_join_request_keeps_unknown_fields_verbatim() {
        let request = JoinRequest::from_value(request_payload()).unwrap();
        assert_eq!(request.to_value(), request_payload());

        let serialized = serde_json::to_value(&request).unwrap();
        assert_eq!(serialized["pantry_request_id"], json!(45));
        assert_eq!(serialized["security_group_ids"][1], json!("sg-89abcdef"));
    }

    #[test]
    fn test_join_request_missing_field() {
        let mut payload = request_payload();
        payload.as_object_mut().unwrap().remove("private_ip");

        let err = JoinRequest::from_value(payload).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidRequest("missing required field 'private_ip'".to_string())
        );
    }

    #[test]
    fn test_join_request_rejects_blank_and_non_string_fields() {
        let mut payload = request_payload();
        payload["instance_name"] = json!("   ");
        assert!(JoinRequest::from_value(payload).is_err());

        let mut payload = request_payload();
        payload["domain"] = json!(42);
        assert!(JoinRequest::from_value(payload).is_err());
    }

    #[test]
    fn test_join_request_rejects_non_object() {
        let err = JoinRequest::from_value(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn test_join_request_from_json_reports_syntax_errors() {
        let err = JoinRequest::from_json("{not json").unwrap_err();
        assert!(matches!(err, CoreError::SerializationError(_)));
    }

    #[test]
    fn test_join_request_ad_ou() {
        let mut payload = request_payload();
        payload["ad_ou"] = json!("OU=Servers,DC=mydomain,DC=tld");
        let request = JoinRequest::from_value(payload).unwrap();
        assert_eq!(request.ad_ou(), Some("OU=Servers,DC=mydomain,DC=tld"));

        let mut payload = request_payload();
        payload["ad_ou"] = json!("");
        let request = JoinRequest::from_value(payload.clone()).unwrap();
        assert_eq!(request.ad_ou(), None);
        // still forwarded exactly as received
        assert_eq!(request.to_value()["ad_ou"], json!(""));

        let mut payload = request_payload();
        payload["ad_ou"] = json!(["OU=Servers"]);
        assert!(JoinRequest::from_value(payload).is_err());
    }

    #[test]
    fn test_join_request_debug_redacts_password() {
        let request = JoinRequest::from_value(request_payload()).unwrap();
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("Strong Password"));
        assert!(rendered.contains("i-0123abcd"));
    }

    #[test]
    fn test_join_request_deserialize() {
        let request: JoinRequest = serde_json::from_value(request_payload()).unwrap();
        assert_eq!(request.instance_id(), "i-0123abcd");

        let result: std::result::Result<JoinRequest, _> =
            serde_json::from_value(json!({ "instance_id": "i-1" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("windows"), Platform::Windows);
        assert_eq!(Platform::parse("Windows"), Platform::Other);
        assert_eq!(Platform::parse(" windows "), Platform::Other);
        assert_eq!(Platform::parse(""), Platform::Other);
        assert_eq!(Platform::parse("linux"), Platform::Other);
        assert!(!Platform::default().is_windows());
    }

    #[test]
    fn test_instance_descriptor_deserialize() {
        let descriptor: InstanceDescriptor = serde_json::from_value(json!({
            "id": "i-1",
            "platform": "windows",
            "state": "running"
        }))
        .unwrap();
        assert!(descriptor.platform.is_windows());
        assert_eq!(descriptor.lifecycle_state, LifecycleState::Running);

        let descriptor: InstanceDescriptor = serde_json::from_value(json!({
            "id": "i-2",
            "lifecycle_state": "shutting-down"
        }))
        .unwrap();
        assert_eq!(descriptor.platform, Platform::Other);
        assert_eq!(descriptor.lifecycle_state, LifecycleState::ShuttingDown);

        let descriptor: InstanceDescriptor = serde_json::from_value(json!({
            "id": "i-3",
            "platform": null,
            "state": "rebooting"
        }))
        .unwrap();
        assert_eq!(descriptor.lifecycle_state, LifecycleState::Unknown);
    }

    #[test]
    fn test_lifecycle_state_terminated() {
        assert!(LifecycleState::Terminated.is_terminated());
        assert!(!LifecycleState::ShuttingDown.is_terminated());
        assert!(!LifecycleState::Running.is_terminated());
    }

    #[test]
    fn test_command_result_helpers() {
        let result = CommandResult::from_lines("10.0.0.1", ["first", "", "third"]);
        assert_eq!(result.lines().len(), 3);
        assert_eq!(result.lines()[0].host, "10.0.0.1");
        assert_eq!(result.joined(","), "first,,third");
        assert!(!result.is_empty());
        assert!(CommandResult::default().is_empty());
    }

    #[test]
    fn test_outcome_disposition() {
        assert_eq!(JoinOutcome::Joined.disposition(), Disposition::Ack);
        assert_eq!(JoinOutcome::AlreadyJoined.disposition(), Disposition::Ack);
        assert_eq!(
            JoinOutcome::ForwardedNonWindows.disposition(),
            Disposition::Ack
        );
        assert_eq!(JoinOutcome::ResolutionFailed.disposition(), Disposition::Ack);
        assert!(JoinOutcome::JoinFailed.is_retryable());
        assert!(JoinOutcome::RenamedAwaitingRetry.is_retryable());
        assert!(JoinOutcome::RenameFailed.is_retryable());
    }

    #[test]
    fn test_ad_credentials_account_and_debug() {
        let credentials = AdCredentials::new("CORP", "svc_join", "hunter2");
        assert_eq!(credentials.account(), "CORP\\svc_join");
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
