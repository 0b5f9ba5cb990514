use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use super::{BlobStore, ClientError, ClientProvider, Deployments, IssueComments, WebApps};
use crate::azure::{ArmClient, BlobClient};
use crate::config::Config;
use crate::github::GithubClient;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArmKey {
    management_url: String,
    subscription_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BlobKey {
    account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GithubKey {
    api_url: String,
    token: String,
}

/// Caller-owned cache of remote clients. Each client is keyed by every
/// parameter that identifies it, so a changed subscription or account always
/// yields a fresh client.
pub struct ClientRegistry {
    management_url: String,
    management_token: Option<String>,
    storage_token: Option<String>,
    poll_interval: Duration,
    github_api_url: String,
    github_token: Option<String>,
    arm: Mutex<HashMap<ArmKey, Arc<ArmClient>>>,
    blobs: Mutex<HashMap<BlobKey, Arc<BlobClient>>>,
    github: Mutex<HashMap<GithubKey, Arc<GithubClient>>>,
}

impl ClientRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            management_url: config.management_url().to_string(),
            management_token: config.management_token(),
            storage_token: config.storage_token(),
            poll_interval: config.poll_interval(),
            github_api_url: config.github_api_url().to_string(),
            github_token: config.github_token(),
            arm: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            github: Mutex::new(HashMap::new()),
        }
    }

    /// Override the GitHub token, e.g. from a CLI flag.
    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        if token.is_some() {
            self.github_token = token;
        }
        self
    }

    fn arm_client(&self, subscription_id: &str) -> Result<Arc<ArmClient>, ClientError> {
        let key = ArmKey {
            management_url: self.management_url.clone(),
            subscription_id: subscription_id.to_string(),
        };
        get_or_build(&self.arm, key, || {
            let token = self
                .management_token
                .as_deref()
                .ok_or(ClientError::MissingAzureToken("AZURE_ACCESS_TOKEN"))?;
            debug!(subscription_id, "creating resource manager client");
            ArmClient::new(&self.management_url, token, self.poll_interval)
        })
    }

    fn blob_client(&self, account: &str) -> Result<Arc<BlobClient>, ClientError> {
        let key = BlobKey {
            account: account.to_string(),
        };
        get_or_build(&self.blobs, key, || {
            let token = self
                .storage_token
                .as_deref()
                .ok_or(ClientError::MissingAzureToken("AZURE_STORAGE_TOKEN"))?;
            debug!(account, "creating blob client");
            BlobClient::new(account, token)
        })
    }

    fn github_client(&self) -> Result<Arc<GithubClient>, ClientError> {
        let token = self
            .github_token
            .clone()
            .ok_or(ClientError::MissingGithubToken)?;
        let key = GithubKey {
            api_url: self.github_api_url.clone(),
            token,
        };
        let token = key.token.clone();
        get_or_build(&self.github, key, || {
            debug!(api_url = %self.github_api_url, "creating github client");
            GithubClient::new(&self.github_api_url, &token)
        })
    }
}

fn get_or_build<K, V, F>(
    cache: &Mutex<HashMap<K, Arc<V>>>,
    key: K,
    build: F,
) -> Result<Arc<V>, ClientError>
where
    K: Eq + Hash,
    F: FnOnce() -> Result<V, ClientError>,
{
    let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(client) = cache.get(&key) {
        return Ok(Arc::clone(client));
    }
    let client = Arc::new(build()?);
    cache.insert(key, Arc::clone(&client));
    Ok(client)
}

impl ClientProvider for ClientRegistry {
    fn web_apps(&self, subscription_id: &str) -> Result<Arc<dyn WebApps>, ClientError> {
        Ok(self.arm_client(subscription_id)?)
    }

    fn deployments(&self, subscription_id: &str) -> Result<Arc<dyn Deployments>, ClientError> {
        Ok(self.arm_client(subscription_id)?)
    }

    fn blob_store(&self, account: &str) -> Result<Arc<dyn BlobStore>, ClientError> {
        Ok(self.blob_client(account)?)
    }

    fn issue_comments(&self) -> Result<Arc<dyn IssueComments>, ClientError> {
        Ok(self.github_client()?)
    }
}
