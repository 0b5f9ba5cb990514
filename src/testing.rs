//! In-memory gateway fakes that record every call in order.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::gateway::{
    AppRef, BlobStore, ClientError, ClientProvider, CommentPage, DeploymentRequest,
    DeploymentResult, DeploymentSlot, Deployments, IssueComment, IssueComments, RemoteError,
    RepoRef, SlotRef, SlotState, WebApp, WebApps,
};
use crate::gateway::types::CommentAuthor;

pub fn hostname_outputs(hostname: &str) -> Value {
    json!({ "hostname": { "type": "String", "value": hostname } })
}

#[derive(Default)]
struct AzureState {
    apps: HashMap<String, String>,
    slots: HashSet<String>,
    outputs: Option<Value>,
    upload_base: String,
    failures: HashMap<&'static str, RemoteError>,
    calls: Vec<String>,
    deployments: Vec<DeploymentRequest>,
}

/// Fake web apps, template deployments and blob storage.
pub struct FakeAzure {
    state: Mutex<AzureState>,
}

impl FakeAzure {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AzureState {
                upload_base: "https://fake.blob".to_string(),
                ..AzureState::default()
            }),
        }
    }

    pub fn with_app(self, name: &str, location: &str) -> Self {
        self.lock().apps.insert(name.to_string(), location.to_string());
        self
    }

    pub fn with_slot(self, name: &str) -> Self {
        self.lock().slots.insert(name.to_string());
        self
    }

    pub fn with_outputs(self, outputs: Value) -> Self {
        self.lock().outputs = Some(outputs);
        self
    }

    pub fn with_upload_base(self, base: &str) -> Self {
        self.lock().upload_base = base.to_string();
        self
    }

    /// Make every call of `operation` fail with `err`.
    pub fn failing(self, operation: &'static str, err: RemoteError) -> Self {
        self.lock().failures.insert(operation, err);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.lock().slots.contains(name)
    }

    pub fn last_deployment(&self) -> Option<DeploymentRequest> {
        self.lock().deployments.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, AzureState> {
        self.state.lock().unwrap()
    }

    /// Record the call and return the configured failure, if any.
    fn enter(
        &self,
        operation: &'static str,
        target: &str,
    ) -> Result<MutexGuard<'_, AzureState>, RemoteError> {
        let mut state = self.lock();
        state.calls.push(format!("{operation}:{target}"));
        if let Some(err) = state.failures.get(operation).cloned() {
            return Err(err);
        }
        Ok(state)
    }

    fn slot_record(state: &AzureState, slot: &SlotRef) -> Result<DeploymentSlot, RemoteError> {
        if !state.slots.contains(&slot.slot_name) {
            return Err(RemoteError::not_found("slot not found"));
        }
        Ok(DeploymentSlot {
            name: slot.slot_name.clone(),
            location: state
                .apps
                .get(&slot.app.app_name)
                .cloned()
                .unwrap_or_default(),
            state: SlotState::Running,
        })
    }
}

#[async_trait]
impl WebApps for FakeAzure {
    async fn get_app(&self, app: &AppRef) -> Result<WebApp, RemoteError> {
        let state = self.enter("get_app", &app.app_name)?;
        let location = state
            .apps
            .get(&app.app_name)
            .cloned()
            .ok_or_else(|| RemoteError::not_found("app not found"))?;
        Ok(WebApp {
            name: app.app_name.clone(),
            location,
            default_host_name: None,
        })
    }

    async fn get_slot(&self, slot: &SlotRef) -> Result<DeploymentSlot, RemoteError> {
        let state = self.enter("get_slot", &slot.slot_name)?;
        Self::slot_record(&state, slot)
    }

    async fn create_or_update_slot(
        &self,
        slot: &SlotRef,
        location: &str,
    ) -> Result<DeploymentSlot, RemoteError> {
        let mut state = self.enter("create_slot", &slot.slot_name)?;
        state.slots.insert(slot.slot_name.clone());
        Ok(DeploymentSlot {
            name: slot.slot_name.clone(),
            location: location.to_string(),
            state: SlotState::Running,
        })
    }

    async fn delete_slot(&self, slot: &SlotRef) -> Result<(), RemoteError> {
        let mut state = self.enter("delete_slot", &slot.slot_name)?;
        if state.slots.remove(&slot.slot_name) {
            Ok(())
        } else {
            Err(RemoteError::not_found("slot not found"))
        }
    }

    async fn start_slot(&self, slot: &SlotRef) -> Result<(), RemoteError> {
        let state = self.enter("start_slot", &slot.slot_name)?;
        Self::slot_record(&state, slot).map(|_| ())
    }

    async fn stop_slot(&self, slot: &SlotRef) -> Result<(), RemoteError> {
        let state = self.enter("stop_slot", &slot.slot_name)?;
        Self::slot_record(&state, slot).map(|_| ())
    }
}

#[async_trait]
impl Deployments for FakeAzure {
    async fn create_or_update_and_wait(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, RemoteError> {
        let mut state = self.enter("deploy", &request.name)?;
        state.deployments.push(request.clone());
        Ok(DeploymentResult {
            provisioning_state: "Succeeded".to_string(),
            outputs: state.outputs.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for FakeAzure {
    async fn upload(
        &self,
        container: &str,
        key: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, RemoteError> {
        let state = self.enter("upload", &format!("{container}/{key}"))?;
        Ok(format!("{}/{}/{}", state.upload_base, container, key))
    }
}

struct GithubState {
    comments: Vec<IssueComment>,
    login: String,
    failures: HashMap<&'static str, RemoteError>,
    calls: Vec<String>,
}

/// Fake issue comment feed with a fixed page size.
pub struct FakeGithub {
    page_size: usize,
    state: Mutex<GithubState>,
}

impl FakeGithub {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            state: Mutex::new(GithubState {
                comments: Vec::new(),
                login: "github-actions[bot]".to_string(),
                failures: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_comment(self, id: u64, author: &str, body: &str) -> Self {
        self.lock().comments.push(IssueComment {
            id,
            user: Some(CommentAuthor {
                login: author.to_string(),
            }),
            body: Some(body.to_string()),
        });
        self
    }

    pub fn failing(self, operation: &'static str, err: RemoteError) -> Self {
        self.lock().failures.insert(operation, err);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Only the create/update calls.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("list:"))
            .collect()
    }

    pub fn comments_by(&self, login: &str) -> usize {
        self.bodies_by(login).len()
    }

    pub fn bodies_by(&self, login: &str) -> Vec<String> {
        self.lock()
            .comments
            .iter()
            .filter(|c| c.author() == Some(login))
            .map(|c| c.body.clone().unwrap_or_default())
            .collect()
    }

    pub fn body_of(&self, id: u64) -> Option<String> {
        self.lock()
            .comments
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.body.clone())
    }

    fn lock(&self) -> MutexGuard<'_, GithubState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl IssueComments for FakeGithub {
    async fn list_comments(
        &self,
        _repo: &RepoRef,
        _issue_number: u64,
        page: u32,
    ) -> Result<CommentPage, RemoteError> {
        let mut state = self.lock();
        state.calls.push(format!("list:{page}"));
        if let Some(err) = state.failures.get("list") {
            return Err(err.clone());
        }
        let start = (page as usize - 1) * self.page_size;
        let comments: Vec<IssueComment> = state
            .comments
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        let has_next = start + self.page_size < state.comments.len();
        Ok(CommentPage { comments, has_next })
    }

    async fn create_comment(
        &self,
        _repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, RemoteError> {
        let mut state = self.lock();
        state.calls.push(format!("create:{issue_number}:{body}"));
        if let Some(err) = state.failures.get("create") {
            return Err(err.clone());
        }
        let id = state.comments.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let comment = IssueComment {
            id,
            user: Some(CommentAuthor {
                login: state.login.clone(),
            }),
            body: Some(body.to_string()),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        _repo: &RepoRef,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, RemoteError> {
        let mut state = self.lock();
        state.calls.push(format!("update:{comment_id}:{body}"));
        if let Some(err) = state.failures.get("update") {
            return Err(err.clone());
        }
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| RemoteError::not_found("comment not found"))?;
        comment.body = Some(body.to_string());
        Ok(comment.clone())
    }
}

/// `ClientProvider` that hands out the same fakes for every identity.
pub struct FakeClients {
    azure: Arc<FakeAzure>,
    github: Arc<FakeGithub>,
}

impl FakeClients {
    pub fn new(azure: Arc<FakeAzure>) -> Self {
        Self {
            azure,
            github: FakeGithub::new(100).shared(),
        }
    }

    pub fn with_github(mut self, github: Arc<FakeGithub>) -> Self {
        self.github = github;
        self
    }

    pub fn shared(self) -> Arc<dyn ClientProvider> {
        Arc::new(self)
    }
}

impl ClientProvider for FakeClients {
    fn web_apps(&self, _subscription_id: &str) -> Result<Arc<dyn WebApps>, ClientError> {
        Ok(self.azure.clone())
    }

    fn deployments(&self, _subscription_id: &str) -> Result<Arc<dyn Deployments>, ClientError> {
        Ok(self.azure.clone())
    }

    fn blob_store(&self, _account: &str) -> Result<Arc<dyn BlobStore>, ClientError> {
        Ok(self.azure.clone())
    }

    fn issue_comments(&self) -> Result<Arc<dyn IssueComments>, ClientError> {
        Ok(self.github.clone())
    }
}
