use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::saga::{Compensation, Saga, Step};
use super::slots::{SlotError, SlotManager};
use crate::gateway::{display_status, ClientError, ClientProvider, DeploymentRequest, RemoteError, SlotRef};

/// Infrastructure template that binds a package to a slot. Versioned with the crate.
const PREVIEW_TEMPLATE: &str = include_str!("../../templates/preview-deploy.json");

const DEPLOYMENT_MODE: &str = "Incremental";

#[derive(Debug, Error)]
pub enum DeployFailure {
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("{}", .0.message)]
    Remote(RemoteError),

    #[error("Host name not returned by ARM deployment.")]
    MissingOutput,

    #[error("Preview template is not valid JSON: {0}")]
    Template(#[from] serde_json::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl DeployFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            DeployFailure::Slot(err) => err.status(),
            DeployFailure::Remote(err) => err.status,
            _ => None,
        }
    }
}

/// Any failure while deploying, tagged with the remote status when one exists.
#[derive(Debug, Error)]
#[error("Failed to deploy app package. StatusCode={} message={source}", display_status(.status))]
pub struct DeployError {
    pub status: Option<u16>,
    pub source: DeployFailure,
}

impl From<DeployFailure> for DeployError {
    fn from(source: DeployFailure) -> Self {
        DeployError {
            status: source.status(),
            source,
        }
    }
}

/// Runs one template deployment against a slot, bracketed by stop and start.
#[derive(Clone)]
pub struct DeploymentExecutor {
    clients: Arc<dyn ClientProvider>,
    slots: SlotManager,
}

impl DeploymentExecutor {
    pub fn new(clients: Arc<dyn ClientProvider>) -> Self {
        let slots = SlotManager::new(clients.clone());
        Self { clients, slots }
    }

    /// Deploy `package_uri` to the slot and return the hostname the template
    /// reports. If the template fails the slot is left stopped.
    #[instrument(skip(self, saga), fields(slot = %slot.slot_name, deployment = deployment_name))]
    pub async fn deploy_to_slot(
        &self,
        slot: &SlotRef,
        deployment_name: &str,
        package_uri: &str,
        saga: &mut Saga,
    ) -> Result<String, DeployError> {
        Ok(self.run(slot, deployment_name, package_uri, saga).await?)
    }

    async fn run(
        &self,
        slot: &SlotRef,
        deployment_name: &str,
        package_uri: &str,
        saga: &mut Saga,
    ) -> Result<String, DeployFailure> {
        let app = &slot.app;
        if self.slots.get_app(app).await?.is_none() {
            return Err(DeployFailure::Precondition(format!(
                "Could not deploy to slot because web app doesn't exist. subscriptionId: {}, resourceGroupName: {}, webAppName: {}, slotName: {}",
                app.subscription_id, app.resource_group, app.app_name, slot.slot_name
            )));
        }

        if self.slots.stop_slot(slot).await?.is_none() {
            debug!("slot not found while stopping; continuing");
        }
        saga.record(Step::StopSlot, Compensation::StartSlot(slot.clone()));

        let request = build_request(slot, deployment_name, package_uri)?;
        info!(deployment = %request.name, "submitting template deployment");
        let deployments = self.clients.deployments(&app.subscription_id)?;
        let result = deployments
            .create_or_update_and_wait(&app.subscription_id, &app.resource_group, &request)
            .await
            .map_err(DeployFailure::Remote)?;
        saga.record(Step::DeployTemplate, Compensation::Nothing);
        debug!(state = %result.provisioning_state, "template deployment finished");

        self.slots.start_slot(slot).await?;
        saga.discharge(Step::StopSlot);
        saga.record(Step::StartSlot, Compensation::Nothing);

        extract_hostname(result.outputs.as_ref()).ok_or(DeployFailure::MissingOutput)
    }
}

/// Build the template invocation for one deploy.
pub fn build_request(
    slot: &SlotRef,
    deployment_name: &str,
    package_uri: &str,
) -> Result<DeploymentRequest, serde_json::Error> {
    let template: Value = serde_json::from_str(PREVIEW_TEMPLATE)?;
    Ok(DeploymentRequest {
        name: deployment_name.to_string(),
        mode: DEPLOYMENT_MODE.to_string(),
        template,
        parameters: json!({
            "appService_Name": { "value": slot.app.app_name },
            "appService_slot": { "value": slot.slot_name },
            "packageUri": { "value": package_uri },
        }),
    })
}

/// `outputs.hostname.value`, if present and non-empty.
pub fn extract_hostname(outputs: Option<&Value>) -> Option<String> {
    outputs?
        .pointer("/hostname/value")
        .and_then(Value::as_str)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}
