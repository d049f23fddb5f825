//! Idea Repository.
//!
//! Keeps the in-memory list of ideas visible to the current session. The
//! remote store enforces ownership; the repository never filters by user.
//! Mutations go straight to the remote store: deletes are reconciled by
//! removing the row locally, creates and updates by the caller re-fetching.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{IdeaBackend, IdeaRow};
use crate::error::{VaultError, VaultResult};
use crate::models::{Idea, IdeaInput};
use crate::search::IdeaQuery;
use crate::session::Session;
use crate::validation::validate_idea_input;

pub struct IdeaRepository<B> {
    backend: Arc<B>,
    ideas: Vec<Idea>,
    last_error: Option<String>,
}

impl<B: IdeaBackend> IdeaRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            ideas: Vec::new(),
            last_error: None,
        }
    }

    /// Ideas from the last successful fetch, minus local removals.
    pub fn ideas(&self) -> &[Idea] {
        &self.ideas
    }

    /// User-facing message of the most recent failed operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn get(&self, id: Uuid) -> Option<&Idea> {
        self.ideas.iter().find(|i| i.id == id)
    }

    /// Drop the cached list, e.g. after sign-out.
    pub fn clear(&mut self) {
        self.ideas.clear();
        self.last_error = None;
    }

    fn record(&mut self, err: VaultError) -> VaultError {
        self.last_error = Some(err.user_message());
        err
    }

    /// Replace the in-memory list with every idea the session can see.
    ///
    /// On failure the previous list is kept and the error recorded.
    pub async fn fetch_all(&mut self, session: &Session) -> VaultResult<&[Idea]> {
        let result = self.backend.select_ideas(&session.access_token).await;
        match result {
            Ok(ideas) => {
                tracing::debug!(user_id = %session.user_id, count = ideas.len(), "Fetched ideas");
                self.ideas = ideas;
                self.last_error = None;
                Ok(self.ideas.as_slice())
            }
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "Failed to fetch ideas");
                Err(self.record(e.into()))
            }
        }
    }

    /// Validate and insert a new idea owned by the session's user.
    ///
    /// The local list is not touched; call [`fetch_all`](Self::fetch_all)
    /// afterwards.
    pub async fn create(&mut self, session: &Session, input: &IdeaInput) -> VaultResult<Idea> {
        validate_idea_input(input)?;
        let row = IdeaRow::new(session.user_id, input);
        let result = self.backend.insert_idea(&session.access_token, &row).await;
        match result {
            Ok(idea) => {
                tracing::info!(idea_id = %idea.id, "Created idea");
                self.last_error = None;
                Ok(idea)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create idea");
                Err(self.record(e.into()))
            }
        }
    }

    /// Validate and overwrite an existing idea.
    pub async fn update(
        &mut self,
        session: &Session,
        id: Uuid,
        input: &IdeaInput,
    ) -> VaultResult<Idea> {
        validate_idea_input(input)?;
        let row = IdeaRow::new(session.user_id, input);
        let result = self
            .backend
            .update_idea(&session.access_token, id, &row)
            .await;
        match result {
            Ok(idea) => {
                tracing::info!(idea_id = %idea.id, "Updated idea");
                self.last_error = None;
                Ok(idea)
            }
            Err(e) => {
                tracing::warn!(idea_id = %id, error = %e, "Failed to update idea");
                Err(self.record(e.into()))
            }
        }
    }

    /// Delete an idea remotely, then drop it from the local list.
    ///
    /// On failure the local list is unchanged.
    pub async fn remove(&mut self, session: &Session, id: Uuid) -> VaultResult<()> {
        let result = self.backend.delete_idea(&session.access_token, id).await;
        match result {
            Ok(()) => {
                self.ideas.retain(|i| i.id != id);
                self.last_error = None;
                tracing::info!(idea_id = %id, "Deleted idea");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(idea_id = %id, error = %e, "Failed to delete idea");
                Err(self.record(e.into()))
            }
        }
    }

    /// Filtered and sorted view of the in-memory list.
    pub fn project(&self, query: &IdeaQuery) -> Vec<Idea> {
        query.apply(&self.ideas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AuthBackend;
    use crate::memory_backend::{BackendOp, MemoryBackend};
    use crate::models::UserMetadata;
    use crate::search::{SortField, SortOrder};

    async fn setup() -> (Arc<MemoryBackend>, Session, IdeaRepository<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let auth = backend
            .sign_in_anonymously(&UserMetadata::guest("dev-1"))
            .await
            .unwrap();
        let repo = IdeaRepository::new(Arc::clone(&backend));
        (backend, Session::from(auth), repo)
    }

    async fn seed(repo: &mut IdeaRepository<MemoryBackend>, session: &Session, titles: &[&str]) {
        for title in titles {
            repo.create(session, &IdeaInput::new(*title, "")).await.unwrap();
        }
        repo.fetch_all(session).await.unwrap();
    }

    fn titles(ideas: &[Idea]) -> Vec<&str> {
        ideas.iter().map(|i| i.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_does_not_touch_local_list() {
        let (_, session, mut repo) = setup().await;
        let idea = repo
            .create(&session, &IdeaInput::new("A", "b"))
            .await
            .unwrap();
        assert_eq!(idea.user_id, session.user_id);
        assert!(repo.ideas().is_empty());

        repo.fetch_all(&session).await.unwrap();
        assert_eq!(titles(repo.ideas()), vec!["A"]);
        assert_eq!(repo.get(idea.id).map(|i| i.content.as_str()), Some("b"));
    }

    #[tokio::test]
    async fn test_fetch_is_newest_first() {
        let (_, session, mut repo) = setup().await;
        seed(&mut repo, &session, &["one", "two", "three"]).await;
        assert_eq!(titles(repo.ideas()), vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_backend() {
        let (backend, session, mut repo) = setup().await;
        let err = repo
            .create(&session, &IdeaInput::new("", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation { ref field, .. } if field == "title"));
        assert!(backend.all_ideas().is_empty());
        assert!(repo.last_error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_list() {
        let (backend, session, mut repo) = setup().await;
        seed(&mut repo, &session, &["one", "two"]).await;
        let before = repo.ideas().to_vec();

        backend.fail_next(BackendOp::SelectIdeas);
        assert!(repo.fetch_all(&session).await.is_err());
        assert_eq!(repo.ideas(), before.as_slice());
        assert!(repo.last_error().is_some());

        repo.fetch_all(&session).await.unwrap();
        assert!(repo.last_error().is_none());
    }

    #[tokio::test]
    async fn test_remove_success_is_optimistic() {
        let (backend, session, mut repo) = setup().await;
        seed(&mut repo, &session, &["one", "two", "three", "four"]).await;
        let target = repo.ideas()[1].id;

        repo.remove(&session, target).await.unwrap();
        assert_eq!(titles(repo.ideas()), vec!["four", "two", "one"]);
        assert!(repo.get(target).is_none());
        assert_eq!(backend.all_ideas().len(), 3);
    }

    #[tokio::test]
    async fn test_remove_failure_leaves_list() {
        let (backend, session, mut repo) = setup().await;
        seed(&mut repo, &session, &["one", "two"]).await;
        let before = repo.ideas().to_vec();

        backend.fail_next(BackendOp::DeleteIdea);
        let target = before[0].id;
        assert!(repo.remove(&session, target).await.is_err());
        assert_eq!(repo.ideas(), before.as_slice());
        assert!(repo.last_error().is_some());
        assert_eq!(backend.all_ideas().len(), 2);
    }

    #[tokio::test]
    async fn test_update_then_refetch() {
        let (_, session, mut repo) = setup().await;
        seed(&mut repo, &session, &["draft"]).await;
        let id = repo.ideas()[0].id;

        let input = IdeaInput::new("final", "done").with_tags(["x"]);
        let updated = repo.update(&session, id, &input).await.unwrap();
        assert_eq!(updated.title, "final");
        assert_eq!(repo.ideas()[0].title, "draft");

        repo.fetch_all(&session).await.unwrap();
        assert_eq!(repo.ideas()[0].tags, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_update_missing_idea_is_not_found() {
        let (_, session, mut repo) = setup().await;
        let err = repo
            .update(&session, Uuid::new_v4(), &IdeaInput::new("t", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_project_uses_local_list() {
        let (_, session, mut repo) = setup().await;
        seed(&mut repo, &session, &["Beta", "alpha", "Gamma"]).await;
        let query = IdeaQuery::new("a").sorted_by(SortField::Title, SortOrder::Asc);
        assert_eq!(titles(&repo.project(&query)), vec!["alpha", "Beta", "Gamma"]);
    }

    #[tokio::test]
    async fn test_other_users_ideas_are_invisible() {
        let (backend, session, mut repo) = setup().await;
        seed(&mut repo, &session, &["mine"]).await;

        let other = Session::from(
            backend
                .sign_in_anonymously(&UserMetadata::guest("dev-2"))
                .await
                .unwrap(),
        );
        let mut other_repo = IdeaRepository::new(Arc::clone(&backend));
        other_repo.fetch_all(&other).await.unwrap();
        assert!(other_repo.ideas().is_empty());
    }
}
