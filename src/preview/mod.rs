pub mod deploy;
pub mod notify;
pub mod saga;
pub mod slots;
pub mod types;

pub use deploy::{DeployError, DeploymentExecutor};
pub use notify::StatusNotifier;
pub use slots::{SlotError, SlotManager};
pub use types::{DeployParams, PullRequestContext, RepositoryConfig, StorageTarget};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::gateway::{display_status, ClientError, ClientProvider};
use saga::{Compensation, Saga, Step};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("Failed to read deploy package {}: {source}", .path.display())]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to upload deploy package. StatusCode={} message={message}", display_status(.status))]
    Upload {
        status: Option<u16>,
        message: String,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub fn started_message() -> String {
    "Deploying latest changes to preview slot.".to_string()
}

pub fn deployed_message(hostname: &str) -> String {
    format!("Deployed to preview-url: [https://{hostname}](https://{hostname})")
}

impl PreviewError {
    /// Remote status code behind the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            PreviewError::Slot(err) => err.status(),
            PreviewError::Deploy(err) => err.status,
            PreviewError::Upload { status, .. } => *status,
            PreviewError::Artifact { .. } | PreviewError::Client(_) => None,
        }
    }

    /// Workflow stage that failed, without resource identifiers.
    pub fn stage(&self) -> &'static str {
        match self {
            PreviewError::Slot(_) => "preparing the preview slot",
            PreviewError::Deploy(_) => "deploying the app package",
            PreviewError::Artifact { .. } => "reading the deploy package",
            PreviewError::Upload { .. } => "uploading the deploy package",
            PreviewError::Client(_) => "connecting to the remote services",
        }
    }
}

/// Public comment body for a failed run. The full error goes to the log and
/// to stderr only.
pub fn failed_message(err: &PreviewError) -> String {
    format!(
        "Preview deployment failed while {}. StatusCode={}",
        err.stage(),
        display_status(&err.status())
    )
}

/// Runs the two preview workflows: deploy a pull request to its slot, and
/// remove the slot again.
pub struct Orchestrator {
    clients: Arc<dyn ClientProvider>,
    slots: SlotManager,
    executor: DeploymentExecutor,
    notifier: StatusNotifier,
}

impl Orchestrator {
    pub fn new(clients: Arc<dyn ClientProvider>) -> Self {
        Self {
            slots: SlotManager::new(clients.clone()),
            executor: DeploymentExecutor::new(clients.clone()),
            notifier: StatusNotifier::new(clients.clone()),
            clients,
        }
    }

    /// Deploy the package to the pull request's slot and return its hostname.
    /// Nothing done before a failure is rolled back.
    pub async fn deploy(&self, params: &DeployParams) -> Result<String, PreviewError> {
        let ctx = &params.context;
        let slot_name = ctx.slot_name();
        let span = info_span!("deploy", pr = ctx.pull_request, app = %ctx.app_name, slot = %slot_name);

        async {
            info!(
                "Starting preview deployment of pr='{}' to webapp='{}' slot='{}'.",
                ctx.pull_request, ctx.app_name, slot_name
            );
            let mut saga = Saga::new("deploy");
            match self.run_deploy(params, &mut saga).await {
                Ok(hostname) => {
                    info!(
                        "Finished preview deployment of pr='{}' to webapp='{}' slot='{}'.",
                        ctx.pull_request, ctx.app_name, slot_name
                    );
                    Ok(hostname)
                }
                Err(err) => {
                    warn!(error = %err, "preview deployment failed");
                    saga.abort(&err);
                    self.notify(params, &failed_message(&err)).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_deploy(&self, params: &DeployParams, saga: &mut Saga) -> Result<String, PreviewError> {
        let ctx = &params.context;
        let slot = ctx.slot();

        self.notify(params, &started_message()).await;
        saga.record(Step::NotifyStarted, Compensation::Nothing);

        self.slots.ensure_slot(&slot).await?;
        saga.record(Step::PrepareSlot, Compensation::Nothing);

        let package_uri = self.upload_artifact(params).await?;
        saga.record(
            Step::UploadArtifact,
            Compensation::DeleteArtifact {
                url: package_uri.clone(),
            },
        );

        let deployment_name = types::deployment_name(&slot.slot_name);
        let hostname = self
            .executor
            .deploy_to_slot(&slot, &deployment_name, &package_uri, saga)
            .await?;

        self.notify(params, &deployed_message(&hostname)).await;
        saga.record(Step::NotifyDeployed, Compensation::Nothing);

        Ok(hostname)
    }

    async fn upload_artifact(&self, params: &DeployParams) -> Result<String, PreviewError> {
        let key = types::artifact_key(params.context.pull_request);
        let bytes = tokio::fs::read(&params.package_path)
            .await
            .map_err(|source| PreviewError::Artifact {
                path: params.package_path.clone(),
                source,
            })?;
        info!(size = bytes.len(), key = %key, container = %params.storage.container, "uploading deploy package");

        let store = self.clients.blob_store(&params.storage.account)?;
        store
            .upload(&params.storage.container, &key, bytes)
            .await
            .map_err(|err| PreviewError::Upload {
                status: err.status,
                message: err.message,
            })
    }

    /// Post a status comment. Failures are logged and never replace the
    /// outcome of the workflow.
    async fn notify(&self, params: &DeployParams, body: &str) {
        let repository = &params.repository;
        if let Err(err) = self
            .notifier
            .upsert_status(
                params.context.pull_request,
                &repository.repo,
                &repository.comment_user,
                body,
            )
            .await
        {
            warn!(error = %err, "failed to post status comment");
        }
    }

    /// Delete the pull request's slot. Posts no status comment.
    pub async fn cleanup(&self, ctx: &PullRequestContext) -> Result<(), PreviewError> {
        let slot = ctx.slot();
        let span = info_span!("cleanup", pr = ctx.pull_request, app = %ctx.app_name, slot = %slot.slot_name);

        async {
            info!(
                "Starting cleanup of preview deployment of pr='{}' to webapp='{}' slot='{}'.",
                ctx.pull_request, ctx.app_name, slot.slot_name
            );
            let deleted = self.slots.delete_slot(&slot).await?;
            info!(
                deleted,
                "Finished cleanup of preview deployment of pr='{}' to webapp='{}' slot='{}'.",
                ctx.pull_request,
                ctx.app_name,
                slot.slot_name
            );
            Ok::<(), PreviewError>(())
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{RemoteError, RepoRef};
    use crate::testing::{hostname_outputs, FakeAzure, FakeClients, FakeGithub};
    use std::io::Write;

    const BOT: &str = "github-actions[bot]";

    struct Harness {
        azure: Arc<FakeAzure>,
        github: Arc<FakeGithub>,
        orchestrator: Orchestrator,
        _package: tempfile::NamedTempFile,
        params: DeployParams,
    }

    fn harness(azure: FakeAzure, pull_request: u64) -> Harness {
        let azure = azure.shared();
        let github = FakeGithub::new(100).shared();
        let clients = FakeClients::new(azure.clone())
            .with_github(github.clone())
            .shared();

        let mut package = tempfile::NamedTempFile::new().unwrap();
        package.write_all(b"PK\x03\x04zip-bytes").unwrap();

        let params = DeployParams {
            context: PullRequestContext {
                subscription_id: "sub-1".to_string(),
                resource_group: "rg-1".to_string(),
                app_name: "contoso".to_string(),
                pull_request,
            },
            package_path: package.path().to_path_buf(),
            storage: StorageTarget {
                account: "previews".to_string(),
                container: "packages".to_string(),
            },
            repository: RepositoryConfig {
                repo: RepoRef {
                    owner: "contoso".to_string(),
                    name: "shop".to_string(),
                },
                comment_user: BOT.to_string(),
            },
        };

        Harness {
            azure,
            github,
            orchestrator: Orchestrator::new(clients),
            _package: package,
            params,
        }
    }

    fn deployable() -> FakeAzure {
        FakeAzure::new()
            .with_app("contoso", "westeurope")
            .with_outputs(hostname_outputs("contoso-pr-42.example.com"))
            .with_upload_base("https://previews.blob.core.windows.net")
    }

    #[tokio::test]
    async fn test_deploy_end_to_end() {
        let h = harness(deployable(), 42);
        let host = h.orchestrator.deploy(&h.params).await.unwrap();

        assert_eq!(host, "contoso-pr-42.example.com");
        assert_eq!(
            h.azure.calls(),
            vec![
                "get_slot:pr-42",
                "get_app:contoso",
                "create_slot:pr-42",
                "upload:packages/42.zip",
                "get_app:contoso",
                "stop_slot:pr-42",
                "deploy:preview-deploy-pr-42",
                "start_slot:pr-42",
            ]
        );

        let request = h.azure.last_deployment().unwrap();
        assert_eq!(request.name, "preview-deploy-pr-42");
        assert_eq!(request.parameters["appService_slot"]["value"], "pr-42");
        assert_eq!(
            request.parameters["packageUri"]["value"],
            "https://previews.blob.core.windows.net/packages/42.zip"
        );
    }

    #[tokio::test]
    async fn test_deploy_keeps_single_status_comment() {
        let h = harness(deployable(), 42);
        h.orchestrator.deploy(&h.params).await.unwrap();

        let writes = h.github.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with("create:42:Deploying latest changes"));
        assert!(writes[1].contains("https://contoso-pr-42.example.com"));
        assert_eq!(h.github.comments_by(BOT), 1);
    }

    #[tokio::test]
    async fn test_deploy_without_app_fails_before_upload() {
        let h = harness(FakeAzure::new(), 42);
        let err = h.orchestrator.deploy(&h.params).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("sub-1"));
        assert!(message.contains("rg-1"));
        assert!(message.contains("contoso"));
        let calls = h.azure.calls();
        assert!(!calls.iter().any(|c| c.starts_with("upload")));
        assert!(!calls.iter().any(|c| c.starts_with("deploy")));
    }

    #[tokio::test]
    async fn test_deploy_failure_posts_failure_status() {
        let h = harness(
            deployable().failing("deploy", RemoteError::new(Some(400), "InvalidTemplate")),
            42,
        );
        let err = h.orchestrator.deploy(&h.params).await.unwrap_err();

        assert!(matches!(err, PreviewError::Deploy(_)));
        let comments = h.github.bodies_by(BOT);
        assert_eq!(comments.len(), 1);
        assert_eq!(
            comments[0],
            "Preview deployment failed while deploying the app package. StatusCode=400"
        );
        assert!(!h.azure.calls().iter().any(|c| c.starts_with("start_slot")));
    }

    #[tokio::test]
    async fn test_failure_comment_omits_resource_identifiers() {
        let h = harness(FakeAzure::new(), 42);
        let err = h.orchestrator.deploy(&h.params).await.unwrap_err();
        assert!(err.to_string().contains("subscriptionId: sub-1"));

        let comments = h.github.bodies_by(BOT);
        assert_eq!(
            comments,
            vec!["Preview deployment failed while preparing the preview slot. StatusCode=undefined"]
        );
        assert!(!comments[0].contains("sub-1"));
        assert!(!comments[0].contains("rg-1"));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_mask_outcome() {
        let h = harness(deployable(), 42);
        let github = FakeGithub::new(100)
            .failing("create", RemoteError::new(Some(403), "Resource not accessible"))
            .shared();
        let clients = FakeClients::new(h.azure.clone()).with_github(github).shared();
        let orchestrator = Orchestrator::new(clients);

        let host = orchestrator.deploy(&h.params).await.unwrap();
        assert_eq!(host, "contoso-pr-42.example.com");
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_upstream_error() {
        let h = harness(
            deployable().failing("upload", RemoteError::new(Some(403), "AuthorizationFailure")),
            42,
        );
        let github = FakeGithub::new(100)
            .failing("list", RemoteError::new(Some(500), "github down"))
            .shared();
        let clients = FakeClients::new(h.azure.clone()).with_github(github).shared();
        let orchestrator = Orchestrator::new(clients);

        let err = orchestrator.deploy(&h.params).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to upload deploy package. StatusCode=403 message=AuthorizationFailure"
        );
    }

    #[tokio::test]
    async fn test_missing_package_is_artifact_error() {
        let mut h = harness(deployable(), 42);
        h.params.package_path = PathBuf::from("/nonexistent/package.zip");
        let err = h.orchestrator.deploy(&h.params).await.unwrap_err();
        assert!(matches!(err, PreviewError::Artifact { .. }));
        assert!(!h.azure.calls().iter().any(|c| c.starts_with("upload")));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_slot_without_comment() {
        let h = harness(
            FakeAzure::new().with_app("contoso", "westeurope").with_slot("pr-7"),
            7,
        );
        h.orchestrator.cleanup(&h.params.context).await.unwrap();

        assert_eq!(h.azure.calls(), vec!["delete_slot:pr-7"]);
        assert!(h.github.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_of_missing_slot_succeeds() {
        let h = harness(FakeAzure::new().with_app("contoso", "westeurope"), 7);
        h.orchestrator.cleanup(&h.params.context).await.unwrap();
        assert_eq!(h.azure.calls(), vec!["delete_slot:pr-7"]);
    }

    #[tokio::test]
    async fn test_cleanup_failure_surfaces() {
        let h = harness(
            FakeAzure::new().failing("delete_slot", RemoteError::new(Some(500), "boom")),
            7,
        );
        let err = h.orchestrator.cleanup(&h.params.context).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to delete web app slot. StatusCode=500 message=boom"
        );
    }
}
