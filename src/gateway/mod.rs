pub mod registry;
pub mod types;

pub use registry::ClientRegistry;
pub use types::{
    AppRef, CommentPage, DeploymentRequest, DeploymentResult, DeploymentSlot, IssueComment,
    RepoRef, SlotRef, SlotState, WebApp,
};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single remote call. `status` is absent for transport errors
/// (DNS, TLS, connection reset) and for malformed responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("StatusCode={} message={message}", display_status(.status))]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    /// 404 is the only status that means "absent" rather than "failed".
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::new(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

pub fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "undefined".to_string(),
    }
}

/// Web app and slot accessors (Microsoft.Web/sites).
#[async_trait]
pub trait WebApps: Send + Sync {
    async fn get_app(&self, app: &AppRef) -> Result<WebApp, RemoteError>;

    async fn get_slot(&self, slot: &SlotRef) -> Result<DeploymentSlot, RemoteError>;

    /// Create or update the slot and wait until provisioning completes.
    async fn create_or_update_slot(
        &self,
        slot: &SlotRef,
        location: &str,
    ) -> Result<DeploymentSlot, RemoteError>;

    async fn delete_slot(&self, slot: &SlotRef) -> Result<(), RemoteError>;

    async fn start_slot(&self, slot: &SlotRef) -> Result<(), RemoteError>;

    async fn stop_slot(&self, slot: &SlotRef) -> Result<(), RemoteError>;
}

/// Resource-group template deployments (Microsoft.Resources/deployments).
#[async_trait]
pub trait Deployments: Send + Sync {
    /// Submit the deployment and wait for a terminal provisioning state.
    async fn create_or_update_and_wait(
        &self,
        subscription_id: &str,
        resource_group: &str,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, RemoteError>;
}

/// Blob upload primitive. Returns the URL of the stored blob.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, container: &str, key: &str, bytes: Vec<u8>)
        -> Result<String, RemoteError>;
}

/// Raw issue comment primitives.
#[async_trait]
pub trait IssueComments: Send + Sync {
    /// Fetch one page (1-based) of the issue's comments, oldest first.
    async fn list_comments(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        page: u32,
    ) -> Result<CommentPage, RemoteError>;

    async fn create_comment(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, RemoteError>;

    async fn update_comment(
        &self,
        repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, RemoteError>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Could not authenticate with Azure. Set {0} or configure it in .preview-deploy.toml.")]
    MissingAzureToken(&'static str),

    #[error("Could not create github client. Must provide a github token.")]
    MissingGithubToken,

    #[error("Access token contains characters that are not valid in an HTTP header")]
    InvalidToken,

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Hands out gateway clients for a given identity. Owned by the caller and
/// injected into the orchestrator.
pub trait ClientProvider: Send + Sync {
    fn web_apps(&self, subscription_id: &str) -> Result<Arc<dyn WebApps>, ClientError>;

    fn deployments(&self, subscription_id: &str) -> Result<Arc<dyn Deployments>, ClientError>;

    fn blob_store(&self, account: &str) -> Result<Arc<dyn BlobStore>, ClientError>;

    fn issue_comments(&self) -> Result<Arc<dyn IssueComments>, ClientError>;
}
