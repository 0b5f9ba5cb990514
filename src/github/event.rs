use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::gateway::RepoRef;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("This action must run in the context of a pull-request.")]
    NotPullRequest,

    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Failed to read event payload: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse event payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Event payload does not carry a pull-request number")]
    MissingNumber,

    #[error("Input required and not supplied: {0}")]
    MissingInput(&'static str),
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    name: String,
    owner: OwnerPayload,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    pull_request: Option<PullRequestPayload>,
    repository: RepositoryPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Deploy,
    Cleanup,
}

/// What a pull-request webhook event asks us to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub pull_request: u64,
    pub repo: RepoRef,
    pub action: EventAction,
}

/// Decide between deploy and cleanup for a GitHub Actions event.
/// A `closed` pull request, or an explicit cleanup request, tears the slot down.
pub fn resolve(event_name: &str, payload: &str, force_cleanup: bool) -> Result<EventContext, EventError> {
    if event_name != "pull_request" {
        return Err(EventError::NotPullRequest);
    }

    let event: PullRequestEvent = serde_json::from_str(payload)?;
    let pull_request = event
        .number
        .or(event.pull_request.map(|pr| pr.number))
        .ok_or(EventError::MissingNumber)?;

    let action = if force_cleanup || event.action.as_deref() == Some("closed") {
        EventAction::Cleanup
    } else {
        EventAction::Deploy
    };

    Ok(EventContext {
        pull_request,
        repo: RepoRef {
            owner: event.repository.owner.login,
            name: event.repository.name,
        },
        action,
    })
}

/// Resolve the event the current workflow run was triggered by.
pub fn from_env(force_cleanup: bool) -> Result<EventContext, EventError> {
    let name = std::env::var("GITHUB_EVENT_NAME")
        .map_err(|_| EventError::MissingEnv("GITHUB_EVENT_NAME"))?;
    let path = std::env::var("GITHUB_EVENT_PATH")
        .map_err(|_| EventError::MissingEnv("GITHUB_EVENT_PATH"))?;
    let payload = std::fs::read_to_string(Path::new(&path))?;
    resolve(&name, &payload, force_cleanup)
}
