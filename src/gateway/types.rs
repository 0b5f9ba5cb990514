use serde::Deserialize;

/// Addresses a web app: subscription, resource group and site name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRef {
    pub subscription_id: String,
    pub resource_group: String,
    pub app_name: String,
}

impl AppRef {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            app_name: app_name.into(),
        }
    }

    pub fn slot(&self, slot_name: impl Into<String>) -> SlotRef {
        SlotRef {
            app: self.clone(),
            slot_name: slot_name.into(),
        }
    }
}

/// Addresses a deployment slot nested under a web app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    pub app: AppRef,
    pub slot_name: String,
}

/// The subset of a web app resource the orchestrator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WebApp {
    pub name: String,
    /// Azure region; new slots are created in the same one.
    pub location: String,
    pub default_host_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Running,
    Stopped,
    Unknown,
}

impl SlotState {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("running") => SlotState::Running,
            Some(s) if s.eq_ignore_ascii_case("stopped") => SlotState::Stopped,
            _ => SlotState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSlot {
    pub name: String,
    pub location: String,
    pub state: SlotState,
}

/// A single infrastructure-template invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub name: String,
    /// Always "Incremental" for preview deployments.
    pub mode: String,
    pub template: serde_json::Value,
    /// ARM-style parameters: `{ "<name>": { "value": ... } }`.
    pub parameters: serde_json::Value,
}

/// Result of a completed template deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentResult {
    pub provisioning_state: String,
    pub outputs: Option<serde_json::Value>,
}

/// Repository that owns the issue/pull request being commented on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
}

/// An issue comment as returned by the GitHub REST API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub user: Option<CommentAuthor>,
    #[serde(default)]
    pub body: Option<String>,
}

impl IssueComment {
    pub fn author(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.login.as_str())
    }
}

/// One page of an issue's comment feed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentPage {
    pub comments: Vec<IssueComment>,
    pub has_next: bool,
}
