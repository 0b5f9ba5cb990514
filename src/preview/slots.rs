use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::gateway::{
    display_status, AppRef, ClientError, ClientProvider, DeploymentSlot, RemoteError, SlotRef,
    WebApp, WebApps,
};

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("Failed to {operation}. StatusCode={} message={message}", display_status(.status))]
    Remote {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SlotError {
    fn remote(operation: &'static str, err: RemoteError) -> Self {
        SlotError::Remote {
            operation,
            status: err.status,
            message: err.message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SlotError::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

/// Map a gateway result onto the lifecycle contract: 404 means absent,
/// anything else is a failure of `operation`.
fn absent_on_404<T>(
    operation: &'static str,
    result: Result<T, RemoteError>,
) -> Result<Option<T>, SlotError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(SlotError::remote(operation, err)),
    }
}

/// Lifecycle of the per-pull-request slots of a web app.
#[derive(Clone)]
pub struct SlotManager {
    clients: Arc<dyn ClientProvider>,
}

impl SlotManager {
    pub fn new(clients: Arc<dyn ClientProvider>) -> Self {
        Self { clients }
    }

    fn web_apps(&self, subscription_id: &str) -> Result<Arc<dyn WebApps>, SlotError> {
        Ok(self.clients.web_apps(subscription_id)?)
    }

    #[instrument(skip(self), fields(app = %app.app_name))]
    pub async fn get_app(&self, app: &AppRef) -> Result<Option<WebApp>, SlotError> {
        let client = self.web_apps(&app.subscription_id)?;
        absent_on_404("get web app", client.get_app(app).await)
    }

    #[instrument(skip(self), fields(slot = %slot.slot_name))]
    pub async fn get_slot(&self, slot: &SlotRef) -> Result<Option<DeploymentSlot>, SlotError> {
        let client = self.web_apps(&slot.app.subscription_id)?;
        absent_on_404("get web app slot", client.get_slot(slot).await)
    }

    /// Create the slot in the parent app's region. Fails without touching the
    /// slot when the parent app does not exist.
    #[instrument(skip(self), fields(slot = %slot.slot_name))]
    pub async fn create_slot(&self, slot: &SlotRef) -> Result<DeploymentSlot, SlotError> {
        let app = &slot.app;
        let site = self.get_app(app).await?.ok_or_else(|| {
            SlotError::Precondition(format!(
                "Could not find web app. subscriptionId: {}, resourceGroupName: {}, webAppName: {}",
                app.subscription_id, app.resource_group, app.app_name
            ))
        })?;

        debug!(location = %site.location, "creating slot");
        let client = self.web_apps(&app.subscription_id)?;
        client
            .create_or_update_slot(slot, &site.location)
            .await
            .map_err(|err| SlotError::remote("create web app slot", err))
    }

    /// Return the existing slot or create it on first use.
    pub async fn ensure_slot(&self, slot: &SlotRef) -> Result<DeploymentSlot, SlotError> {
        if let Some(existing) = self.get_slot(slot).await? {
            debug!(slot = %existing.name, "slot already exists");
            return Ok(existing);
        }
        info!(slot = %slot.slot_name, app = %slot.app.app_name, "creating preview slot");
        self.create_slot(slot).await
    }

    /// Delete the slot. A slot that is already gone counts as deleted;
    /// returns whether a slot was actually removed.
    #[instrument(skip(self), fields(slot = %slot.slot_name))]
    pub async fn delete_slot(&self, slot: &SlotRef) -> Result<bool, SlotError> {
        let client = self.web_apps(&slot.app.subscription_id)?;
        match absent_on_404("delete web app slot", client.delete_slot(slot).await)? {
            Some(()) => Ok(true),
            None => {
                info!(slot = %slot.slot_name, "slot already absent; nothing to delete");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self), fields(slot = %slot.slot_name))]
    pub async fn start_slot(&self, slot: &SlotRef) -> Result<Option<()>, SlotError> {
        let client = self.web_apps(&slot.app.subscription_id)?;
        absent_on_404("start web app slot", client.start_slot(slot).await)
    }

    #[instrument(skip(self), fields(slot = %slot.slot_name))]
    pub async fn stop_slot(&self, slot: &SlotRef) -> Result<Option<()>, SlotError> {
        let client = self.web_apps(&slot.app.subscription_id)?;
        absent_on_404("stop web app slot", client.stop_slot(slot).await)
    }
}
