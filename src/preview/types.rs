use std::path::PathBuf;

use crate::gateway::{AppRef, RepoRef, SlotRef};

/// Slot that hosts the preview of a pull request.
pub fn slot_name(pull_request: u64) -> String {
    format!("pr-{pull_request}")
}

/// Name of the template deployment that targets `slot`.
pub fn deployment_name(slot: &str) -> String {
    format!("preview-deploy-{slot}")
}

/// Blob key the build artifact of a pull request is uploaded under.
pub fn artifact_key(pull_request: u64) -> String {
    format!("{pull_request}.zip")
}

/// Identifies the unit of work: one pull request against one web app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestContext {
    pub subscription_id: String,
    pub resource_group: String,
    pub app_name: String,
    pub pull_request: u64,
}

impl PullRequestContext {
    pub fn slot_name(&self) -> String {
        slot_name(self.pull_request)
    }

    pub fn app(&self) -> AppRef {
        AppRef::new(&self.subscription_id, &self.resource_group, &self.app_name)
    }

    pub fn slot(&self) -> SlotRef {
        self.app().slot(self.slot_name())
    }
}

/// Storage account and container the artifact is uploaded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub account: String,
    pub container: String,
}

/// Where status comments are posted and who authors them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub repo: RepoRef,
    pub comment_user: String,
}

#[derive(Debug, Clone)]
pub struct DeployParams {
    pub context: PullRequestContext,
    pub package_path: PathBuf,
    pub storage: StorageTarget,
    pub repository: RepositoryConfig,
}
