//! Docker Engine API client over plain TCP.
//!
//! Speaks the documented REST endpoints (`/containers`, `/images`,
//! `/networks`) with one HTTP/1 connection per call. The image pull is
//! the only streaming call: its newline-delimited JSON progress is turned
//! into [`PullEvent`]s on a channel.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use hive_core::net::{self, HttpRequest, HttpResponse};
use hive_core::types::ImageRef;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ContainerConfig, ContainerRuntime, ContainerSummary, PullEvent};

const PULL_CHANNEL_CAPACITY: usize = 64;

/// Container runtime backed by a Docker Engine listening on TCP.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    endpoint: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
struct CreatedContainer {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize)]
struct ListedContainer {
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
}

#[derive(Deserialize)]
struct PullLine {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl DockerRuntime {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(&self, request: HttpRequest, what: &str) -> RuntimeResult<HttpResponse> {
        let response = net::send(&self.endpoint, request, self.timeout).await?;
        check(response, what)
    }
}

/// Map non-success statuses to runtime errors. 304 counts as success
/// (container already started or stopped).
fn check(response: HttpResponse, what: &str) -> RuntimeResult<HttpResponse> {
    let status = response.status.as_u16();
    if response.is_success() || status == 304 {
        return Ok(response);
    }
    if status == 404 {
        return Err(RuntimeError::NotFound(what.to_string()));
    }
    let message = response
        .json::<ApiMessage>()
        .map(|m| m.message)
        .unwrap_or_else(|_| response.text());
    Err(RuntimeError::Api { status, message })
}

/// Request body for `POST /containers/create`.
fn create_body(config: &ContainerConfig) -> serde_json::Value {
    let tcp = format!("{}/tcp", config.container_port);
    let udp = format!("{}/udp", config.container_port);
    let binding = json!([{ "HostPort": config.host_port.to_string() }]);
    let mut body = json!({
        "Image": config.image,
        "Env": config.env,
        "ExposedPorts": { tcp.clone(): {}, udp.clone(): {} },
        "HostConfig": {
            "NanoCPUs": config.nano_cpus,
            "Memory": config.memory_bytes,
            "Binds": [format!(
                "{}:{}",
                config.volume_host_path.display(),
                config.volume_container_path
            )],
            "PortBindings": { tcp: binding.clone(), udp: binding },
            "RestartPolicy": { "Name": "unless-stopped" },
            "NetworkMode": config.network,
        },
    });
    if !config.cmd.is_empty() {
        body["Cmd"] = json!(config.cmd);
    }
    body
}

/// Parse one line of pull output.
fn pull_event(line: &[u8]) -> Option<PullEvent> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<PullLine>(text) {
        Ok(PullLine {
            error: Some(error), ..
        }) => Some(PullEvent::Failed(error)),
        Ok(PullLine { status, id, .. }) => Some(PullEvent::Progress {
            id,
            status: status.unwrap_or_default(),
        }),
        Err(e) => {
            debug!(error = %e, line = %text, "skipping unparseable pull line");
            None
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_network(&self, name: &str) -> RuntimeResult<()> {
        match self
            .call(HttpRequest::get(format!("/networks/{name}")), name)
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let request = HttpRequest::post("/networks/create")
            .json(&json!({ "Name": name, "Driver": "bridge", "CheckDuplicate": true }))?;
        self.call(request, name).await?;
        debug!(network = %name, "network created");
        Ok(())
    }

    async fn pull_image(&self, image: &ImageRef) -> RuntimeResult<mpsc::Receiver<PullEvent>> {
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            image.repository(),
            image.tag
        );
        let response = net::send_streaming(&self.endpoint, HttpRequest::post(path)).await?;
        let status = response.status();
        let mut body = response.into_body();
        if !status.is_success() {
            let bytes = body
                .collect()
                .await
                .map(|c| c.to_bytes())
                .unwrap_or_default();
            return Err(check(HttpResponse { status, body: bytes }, &image.to_string())
                .err()
                .unwrap_or_else(|| RuntimeError::Pull(format!("status {status}"))));
        }

        let (tx, rx) = mpsc::channel(PULL_CHANNEL_CAPACITY);
        let image = image.to_string();
        tokio::spawn(async move {
            let mut buffer = BytesMut::new();
            loop {
                match body.frame().await {
                    Some(Ok(frame)) => {
                        let Ok(data) = frame.into_data() else {
                            continue;
                        };
                        buffer.extend_from_slice(&data);
                        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line = buffer.split_to(pos + 1);
                            if let Some(event) = pull_event(&line) {
                                let failed = matches!(event, PullEvent::Failed(_));
                                if tx.send(event).await.is_err() || failed {
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%image, error = %e, "pull stream broke");
                        let _ = tx.send(PullEvent::Failed(e.to_string())).await;
                        return;
                    }
                    None => break,
                }
            }
            if !buffer.is_empty()
                && let Some(event) = pull_event(&buffer)
            {
                let failed = matches!(event, PullEvent::Failed(_));
                let _ = tx.send(event).await;
                if failed {
                    return;
                }
            }
            let _ = tx.send(PullEvent::Done).await;
        });
        Ok(rx)
    }

    async fn create_container(&self, config: &ContainerConfig) -> RuntimeResult<String> {
        let request = HttpRequest::post(format!("/containers/create?name={}", config.name))
            .json(&create_body(config))?;
        let response = self.call(request, &config.image).await?;
        let created: CreatedContainer = response
            .json()
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    async fn start_container(&self, name: &str) -> RuntimeResult<()> {
        self.call(HttpRequest::post(format!("/containers/{name}/start")), name)
            .await
            .map(|_| ())
    }

    async fn stop_container(&self, name: &str) -> RuntimeResult<()> {
        self.call(HttpRequest::post(format!("/containers/{name}/stop")), name)
            .await
            .map(|_| ())
    }

    async fn restart_container(&self, name: &str) -> RuntimeResult<()> {
        self.call(HttpRequest::post(format!("/containers/{name}/restart")), name)
            .await
            .map(|_| ())
    }

    async fn remove_container(&self, name: &str) -> RuntimeResult<()> {
        self.call(HttpRequest::delete(format!("/containers/{name}?force=true")), name)
            .await
            .map(|_| ())
    }

    async fn remove_image(&self, image: &str) -> RuntimeResult<()> {
        self.call(HttpRequest::delete(format!("/images/{image}")), image)
            .await
            .map(|_| ())
    }

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>> {
        let response = self
            .call(HttpRequest::get(format!("/containers/json?all={all}")), "containers")
            .await?;
        let listed: Vec<ListedContainer> = response
            .json()
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;
        Ok(listed
            .into_iter()
            .filter_map(|c| {
                let name = c.names.first()?.trim_start_matches('/').to_string();
                Some(ContainerSummary {
                    name,
                    image: c.image,
                    running: c.state == "running",
                })
            })
            .collect())
    }
}
