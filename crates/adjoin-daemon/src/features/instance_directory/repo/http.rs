use super::InstanceDirectory;
use crate::shared::error::{DaemonError, DaemonResult};
use crate::shared::types::InstanceDescriptor;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Instance directory backed by the control plane's REST facade.
///
/// `GET {base}/instances/{id}` returns a descriptor or 404,
/// `POST {base}/instances/{id}/reboot` requests a reboot.
pub struct HttpInstanceDirectory {
    client: Client,
    base_url: String,
}

impl HttpInstanceDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> DaemonResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DaemonError::Config(format!("failed to build instance directory client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn instance_url(&self, instance_id: &str) -> Option<String> {
        is_addressable(instance_id).then(|| format!("{}/instances/{instance_id}", self.base_url))
    }
}

fn is_addressable(instance_id: &str) -> bool {
    !instance_id.is_empty()
        && instance_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl InstanceDirectory for HttpInstanceDirectory {
    async fn find(&self, instance_id: &str) -> DaemonResult<Option<InstanceDescriptor>> {
        let Some(url) = self.instance_url(instance_id) else {
            debug!(%instance_id, "Instance id cannot name an instance");
            return Ok(None);
        };

        let response = self.client.get(&url).send().await.map_err(|e| {
            DaemonError::Directory(format!("failed to look up instance {instance_id}: {e}"))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response.error_for_status().map_err(|e| {
            DaemonError::Directory(format!("failed to look up instance {instance_id}: {e}"))
        })?;

        let descriptor = response.json::<InstanceDescriptor>().await.map_err(|e| {
            DaemonError::Directory(format!(
                "invalid descriptor for instance {instance_id}: {e}"
            ))
        })?;

        Ok(Some(descriptor))
    }

    async fn reboot(&self, instance_id: &str) -> DaemonResult<()> {
        let url = self.instance_url(instance_id).ok_or_else(|| {
            DaemonError::Directory(format!("cannot address instance '{instance_id}'"))
        })?;

        self.client
            .post(format!("{url}/reboot"))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map(|_| ())
            .map_err(|e| DaemonError::Directory(format!("failed to reboot {instance_id}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> HttpInstanceDirectory {
        HttpInstanceDirectory::new("http://control-plane.internal/api/", Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_instance_url_trims_trailing_slash() {
        assert_eq!(
            directory().instance_url("i-0123abcd").as_deref(),
            Some("http://control-plane.internal/api/instances/i-0123abcd")
        );
    }

    #[test]
    fn test_instance_url_rejects_path_characters() {
        let directory = directory();
        assert!(directory.instance_url("../admin").is_none());
        assert!(directory.instance_url("i-1?x=y").is_none());
        assert!(directory.instance_url("").is_none());
    }

    #[tokio::test]
    async fn test_find_unaddressable_id_is_absent_without_request() {
        let result = directory().find("i-1/../../secrets").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_reboot_unaddressable_id_fails() {
        let result = directory().reboot("bad id").await;
        assert!(matches!(result, Err(DaemonError::Directory(_))));
    }

    mod against_local_server {
        use super::*;
        use crate::shared::types::{LifecycleState, Platform};
        use axum::extract::{Path, State};
        use axum::http::StatusCode as AxumStatus;
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use serde_json::json;
        use std::sync::{Arc, Mutex};

        type Reboots = Arc<Mutex<Vec<String>>>;

        async fn spawn_control_plane() -> (HttpInstanceDirectory, Reboots) {
            let reboots: Reboots = Arc::default();
            let app = Router::new()
                .route(
                    "/api/instances/:id",
                    get(|Path(id): Path<String>| async move {
                        match id.as_str() {
                            "i-win" => Ok(Json(json!({
                                "id": "i-win",
                                "platform": "windows",
                                "state": "running"
                            }))),
                            "i-broken" => Ok(Json(json!({ "id": 7 }))),
                            "i-flaky" => Err(AxumStatus::SERVICE_UNAVAILABLE),
                            _ => Err(AxumStatus::NOT_FOUND),
                        }
                    }),
                )
                .route(
                    "/api/instances/:id/reboot",
                    post(
                        |State(reboots): State<Reboots>, Path(id): Path<String>| async move {
                            if id == "i-win" {
                                reboots.lock().unwrap().push(id);
                                AxumStatus::ACCEPTED
                            } else {
                                AxumStatus::NOT_FOUND
                            }
                        },
                    ),
                )
                .with_state(reboots.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let directory =
                HttpInstanceDirectory::new(format!("http://{addr}/api"), Duration::from_secs(5))
                    .unwrap();
            (directory, reboots)
        }

        #[tokio::test]
        async fn test_find_parses_descriptor() {
            let (directory, _) = spawn_control_plane().await;
            let found = directory.find("i-win").await.unwrap();
            assert_eq!(
                found,
                Some(InstanceDescriptor::new(
                    "i-win",
                    Platform::Windows,
                    LifecycleState::Running
                ))
            );
        }

        #[tokio::test]
        async fn test_find_missing_and_failing() {
            let (directory, _) = spawn_control_plane().await;
            assert!(directory.find("i-gone").await.unwrap().is_none());
            assert!(matches!(
                directory.find("i-flaky").await,
                Err(DaemonError::Directory(_))
            ));
            assert!(matches!(
                directory.find("i-broken").await,
                Err(DaemonError::Directory(_))
            ));
        }

        #[tokio::test]
        async fn test_reboot_posts_to_instance() {
            let (directory, reboots) = spawn_control_plane().await;
            directory.reboot("i-win").await.unwrap();
            assert_eq!(*reboots.lock().unwrap(), vec!["i-win".to_string()]);
            assert!(directory.reboot("i-gone").await.is_err());
        }
    }
}
