pub mod operation;
pub mod storage;

pub use storage::BlobClient;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::gateway::{
    AppRef, ClientError, DeploymentRequest, DeploymentResult, DeploymentSlot, Deployments,
    RemoteError, SlotRef, SlotState, WebApp, WebApps,
};
use operation::{OperationStatus, ProvisioningState};

const WEB_API_VERSION: &str = "2022-03-01";
const DEPLOYMENTS_API_VERSION: &str = "2021-04-01";

/// Azure Resource Manager client for web apps and template deployments.
pub struct ArmClient {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteProperties {
    #[serde(default)]
    default_host_name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
struct SiteResponse {
    name: String,
    location: String,
    #[serde(default)]
    properties: Option<SiteProperties>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentProperties {
    #[serde(default)]
    provisioning_state: Option<String>,
    #[serde(default)]
    outputs: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct DeploymentResponse {
    #[serde(default)]
    properties: Option<DeploymentProperties>,
}

impl ArmClient {
    pub fn new(
        base_url: &str,
        token: &str,
        poll_interval: Duration,
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| ClientError::InvalidToken)?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent("preview-deploy")
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval,
        })
    }

    fn site_url(&self, app: &AppRef) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites/{}",
            self.base_url, app.subscription_id, app.resource_group, app.app_name
        )
    }

    fn slot_url(&self, slot: &SlotRef) -> String {
        format!("{}/slots/{}", self.site_url(&slot.app), slot.slot_name)
    }

    fn deployment_url(&self, subscription_id: &str, resource_group: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}",
            self.base_url, subscription_id, resource_group, name
        )
    }

    /// Send the request and turn any non-2xx response into a `RemoteError`
    /// carrying the ARM error message.
    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(
            Some(status.as_u16()),
            arm_error_message(&body).unwrap_or_else(|| fallback_message(status, &body)),
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        api_version: &str,
    ) -> Result<T, RemoteError> {
        let response = self
            .send(self.http.get(url).query(&[("api-version", api_version)]))
            .await?;
        response.json::<T>().await.map_err(RemoteError::from)
    }

    /// Follow an ARM long-running operation until it reaches a terminal state.
    /// Supports both the `Azure-AsyncOperation` and the `Location` polling styles.
    async fn wait_for_operation(&self, response: Response) -> Result<(), RemoteError> {
        let headers = response.headers().clone();
        let initial_status = response.status();

        if let Some(url) = header_str(&headers, "azure-asyncoperation") {
            loop {
                tokio::time::sleep(self.poll_interval).await;
                let body: Value = self.send(self.http.get(&url)).await?.json().await?;
                if operation_finished(&body)? {
                    return Ok(());
                }
                debug!(url = %url, "operation still running");
            }
        }

        if initial_status == StatusCode::ACCEPTED {
            if let Some(url) = header_str(&headers, "location") {
                loop {
                    tokio::time::sleep(self.poll_interval).await;
                    let polled = self.send(self.http.get(&url)).await?;
                    if polled.status() != StatusCode::ACCEPTED {
                        return Ok(());
                    }
                    debug!(url = %url, "operation still accepted");
                }
            }
        }

        Ok(())
    }

    /// Poll a resource until its `properties.provisioningState` is terminal.
    async fn wait_for_provisioning(&self, url: &str, api_version: &str) -> Result<Value, RemoteError> {
        loop {
            let body: Value = self.get_json(url, api_version).await?;
            if ProvisioningState::from_resource(&body).is_terminal() {
                return Ok(body);
            }
            debug!(url = %url, "resource still provisioning");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Extract `error.message` from an ARM error body.
fn arm_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.pointer("/Message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn fallback_message(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

fn site_to_slot(site: SiteResponse) -> DeploymentSlot {
    let state = SlotState::parse(site.properties.as_ref().and_then(|p| p.state.as_deref()));
    // ARM reports slot names as "<app>/<slot>"
    let name = site
        .name
        .rsplit('/')
        .next()
        .unwrap_or(site.name.as_str())
        .to_string();
    DeploymentSlot {
        name,
        location: site.location,
        state,
    }
}

#[async_trait]
impl WebApps for ArmClient {
    #[instrument(skip(self), fields(app = %app.app_name))]
    async fn get_app(&self, app: &AppRef) -> Result<WebApp, RemoteError> {
        let site: SiteResponse = self.get_json(&self.site_url(app), WEB_API_VERSION).await?;
        Ok(WebApp {
            name: site.name,
            location: site.location,
            default_host_name: site.properties.and_then(|p| p.default_host_name),
        })
    }

    #[instrument(skip(self), fields(app = %slot.app.app_name, slot = %slot.slot_name))]
    async fn get_slot(&self, slot: &SlotRef) -> Result<DeploymentSlot, RemoteError> {
        let site: SiteResponse = self.get_json(&self.slot_url(slot), WEB_API_VERSION).await?;
        Ok(site_to_slot(site))
    }

    #[instrument(skip(self), fields(app = %slot.app.app_name, slot = %slot.slot_name))]
    async fn create_or_update_slot(
        &self,
        slot: &SlotRef,
        location: &str,
    ) -> Result<DeploymentSlot, RemoteError> {
        let url = self.slot_url(slot);
        debug!(location, "submitting slot create-or-update");
        let response = self
            .send(
                self.http
                    .put(&url)
                    .query(&[("api-version", WEB_API_VERSION)])
                    .json(&json!({ "location": location })),
            )
            .await?;
        self.wait_for_operation(response).await?;
        self.get_slot(slot).await
    }

    #[instrument(skip(self), fields(app = %slot.app.app_name, slot = %slot.slot_name))]
    async fn delete_slot(&self, slot: &SlotRef) -> Result<(), RemoteError> {
        let request = self
            .http
            .delete(self.slot_url(slot))
            .query(&[("api-version", WEB_API_VERSION)]);
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(app = %slot.app.app_name, slot = %slot.slot_name))]
    async fn start_slot(&self, slot: &SlotRef) -> Result<(), RemoteError> {
        let url = format!("{}/start", self.slot_url(slot));
        self.send(self.http.post(url).query(&[("api-version", WEB_API_VERSION)]))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(app = %slot.app.app_name, slot = %slot.slot_name))]
    async fn stop_slot(&self, slot: &SlotRef) -> Result<(), RemoteError> {
        let url = format!("{}/stop", self.slot_url(slot));
        self.send(self.http.post(url).query(&[("api-version", WEB_API_VERSION)]))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Deployments for ArmClient {
    #[instrument(skip(self, request), fields(deployment = %request.name))]
    async fn create_or_update_and_wait(
        &self,
        subscription_id: &str,
        resource_group: &str,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, RemoteError> {
        let url = self.deployment_url(subscription_id, resource_group, &request.name);
        let body = json!({
            "properties": {
                "mode": request.mode,
                "template": request.template,
                "parameters": request.parameters,
            }
        });

        debug!("submitting template deployment");
        let response = self
            .send(
                self.http
                    .put(&url)
                    .query(&[("api-version", DEPLOYMENTS_API_VERSION)])
                    .json(&body),
            )
            .await?;
        self.wait_for_operation(response).await?;

        let body = self.wait_for_provisioning(&url, DEPLOYMENTS_API_VERSION).await?;
        deployment_outcome(body)
    }
}

/// Whether an `Azure-AsyncOperation` status body is done. A failed or
/// canceled operation is an error carrying the service message.
fn operation_finished(body: &Value) -> Result<bool, RemoteError> {
    match OperationStatus::from_body(body) {
        OperationStatus::InProgress => Ok(false),
        OperationStatus::Succeeded => Ok(true),
        OperationStatus::Failed(message) => Err(RemoteError::new(None, message)),
    }
}

/// Map a settled deployment resource onto its result. Any state other than
/// `Succeeded` is a failure naming the state and the ARM error message.
fn deployment_outcome(body: Value) -> Result<DeploymentResult, RemoteError> {
    let deployment: DeploymentResponse = serde_json::from_value(body)
        .map_err(|e| RemoteError::new(None, format!("Malformed deployment response: {e}")))?;
    let properties = deployment.properties.unwrap_or_default();
    let provisioning_state = properties
        .provisioning_state
        .unwrap_or_else(|| "Unknown".to_string());

    if !provisioning_state.eq_ignore_ascii_case("Succeeded") {
        let detail = properties
            .error
            .as_ref()
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("no error details");
        return Err(RemoteError::new(
            None,
            format!("Deployment ended in state {provisioning_state}: {detail}"),
        ));
    }

    Ok(DeploymentResult {
        provisioning_state,
        outputs: properties.outputs,
    })
}
