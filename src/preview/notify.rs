use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::gateway::{
    display_status, ClientError, ClientProvider, IssueComment, IssueComments, RemoteError, RepoRef,
};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to {operation}. StatusCode={} message={message}", display_status(.status))]
    Remote {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl NotifyError {
    fn remote(operation: &'static str, err: RemoteError) -> Self {
        NotifyError::Remote {
            operation,
            status: err.status,
            message: err.message,
        }
    }
}

/// What `upsert_status` wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    Created(u64),
    Updated(u64),
}

/// Lazy cursor over an issue's comment feed, one page in memory at a time.
pub struct CommentPages<'a> {
    comments: &'a dyn IssueComments,
    repo: &'a RepoRef,
    issue: u64,
    next_page: Option<u32>,
}

impl<'a> CommentPages<'a> {
    pub fn new(comments: &'a dyn IssueComments, repo: &'a RepoRef, issue: u64) -> Self {
        Self {
            comments,
            repo,
            issue,
            next_page: Some(1),
        }
    }

    /// Fetch the next page, or `None` once the feed is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<IssueComment>>, RemoteError> {
        let Some(page) = self.next_page else {
            return Ok(None);
        };
        let fetched = self.comments.list_comments(self.repo, self.issue, page).await?;
        self.next_page = if fetched.has_next && !fetched.comments.is_empty() {
            Some(page + 1)
        } else {
            None
        };
        Ok(Some(fetched.comments))
    }

    /// Start again from the first page.
    #[allow(dead_code)] // Status upsert walks the feed once
    pub fn restart(&mut self) {
        self.next_page = Some(1);
    }
}

/// Keeps one status comment per (issue, author) up to date.
#[derive(Clone)]
pub struct StatusNotifier {
    clients: Arc<dyn ClientProvider>,
}

impl StatusNotifier {
    pub fn new(clients: Arc<dyn ClientProvider>) -> Self {
        Self { clients }
    }

    /// First comment on the issue written by `author`, scanning pages lazily.
    pub async fn find_by_author(
        &self,
        comments: &dyn IssueComments,
        repo: &RepoRef,
        issue: u64,
        author: &str,
    ) -> Result<Option<IssueComment>, NotifyError> {
        let mut pages = CommentPages::new(comments, repo, issue);
        while let Some(page) = pages
            .next_page()
            .await
            .map_err(|err| NotifyError::remote("list issue comments", err))?
        {
            if let Some(found) = page.into_iter().find(|c| c.author() == Some(author)) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Overwrite the author's existing comment, or create it if there is none.
    #[instrument(skip(self, body), fields(owner = %repo.owner, repo = %repo.name))]
    pub async fn upsert_status(
        &self,
        issue: u64,
        repo: &RepoRef,
        author: &str,
        body: &str,
    ) -> Result<StatusWrite, NotifyError> {
        let comments = self.clients.issue_comments()?;
        match self.find_by_author(comments.as_ref(), repo, issue, author).await? {
            Some(existing) => {
                debug!(comment_id = existing.id, "updating status comment");
                comments
                    .update_comment(repo, existing.id, body)
                    .await
                    .map_err(|err| NotifyError::remote("update issue comment", err))?;
                Ok(StatusWrite::Updated(existing.id))
            }
            None => {
                debug!("creating status comment");
                let created = comments
                    .create_comment(repo, issue, body)
                    .await
                    .map_err(|err| NotifyError::remote("create issue comment", err))?;
                Ok(StatusWrite::Created(created.id))
            }
        }
    }
}
