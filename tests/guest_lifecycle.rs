//! End-to-end guest lifecycle against the in-process backend.

use std::sync::Arc;

use sparkvault::device::DeviceIdentityProvider;
use sparkvault::memory_backend::{BackendOp, MemoryBackend, PromotionMode};
use sparkvault::preferences::MemoryPreferenceStore;
use sparkvault::session::SessionKind;
use sparkvault::{
    IdeaInput, IdeaQuery, IdeaRepository, SessionManager, SortField, SortOrder, VaultError,
    ViewMode,
};

const EMAIL: &str = "x@example.com";
const PASSWORD: &str = "Correct-Horse-42";

fn setup(mode: PromotionMode) -> (SessionManager<MemoryBackend>, IdeaRepository<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::with_promotion_mode(mode));
    (
        SessionManager::new(Arc::clone(&backend)),
        IdeaRepository::new(backend),
    )
}

async fn guest_to_account(mode: PromotionMode) {
    let (sessions, mut repo) = setup(mode);

    let guest = sessions.sign_in_as_guest(Some("dev-1")).await.unwrap();
    assert_eq!(guest.kind(), SessionKind::Guest);

    repo.create(&guest, &IdeaInput::new("A", "b")).await.unwrap();
    repo.fetch_all(&guest).await.unwrap();
    assert_eq!(repo.ideas().len(), 1);
    assert_eq!(repo.ideas()[0].user_id, guest.user_id);

    let promotion = sessions
        .promote_guest_to_account(EMAIL, PASSWORD)
        .await
        .unwrap();
    let account = promotion.session;
    assert_eq!(account.kind(), SessionKind::Credentialed);
    assert_eq!(account.email.as_deref(), Some(EMAIL));
    assert_eq!(promotion.old_user_id, guest.user_id);

    repo.fetch_all(&account).await.unwrap();
    assert_eq!(repo.ideas().len(), 1);
    let idea = &repo.ideas()[0];
    assert_eq!(idea.title, "A");
    assert_eq!(idea.content, "b");
    assert_eq!(idea.user_id, account.user_id);

    // The account can also sign in again later and still sees the idea
    sessions.sign_out().await.unwrap();
    let again = sessions.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(again.user_id, account.user_id);
    repo.fetch_all(&again).await.unwrap();
    assert_eq!(repo.ideas().len(), 1);
}

#[tokio::test]
async fn test_guest_to_account_with_new_identity() {
    guest_to_account(PromotionMode::NewIdentity).await;
}

#[tokio::test]
async fn test_guest_to_account_in_place() {
    guest_to_account(PromotionMode::InPlace).await;
}

#[tokio::test]
async fn test_promotion_of_account_is_rejected() {
    let (sessions, mut repo) = setup(PromotionMode::NewIdentity);
    let account = sessions.sign_up("a@example.com", PASSWORD).await.unwrap();
    repo.create(&account, &IdeaInput::new("kept", "")).await.unwrap();

    let err = sessions
        .promote_guest_to_account(EMAIL, PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotGuest));

    repo.fetch_all(&account).await.unwrap();
    assert!(repo.ideas().iter().all(|i| i.user_id == account.user_id));
}

#[tokio::test]
async fn test_partial_migration_is_distinct_and_recoverable() {
    let (sessions, mut repo) = setup(PromotionMode::NewIdentity);
    let guest = sessions.sign_in_as_guest(Some("dev-1")).await.unwrap();
    repo.create(&guest, &IdeaInput::new("A", "b")).await.unwrap();
    repo.create(&guest, &IdeaInput::new("B", "")).await.unwrap();

    sessions.backend().fail_next(BackendOp::ReassignOwner);
    let err = sessions
        .promote_guest_to_account(EMAIL, PASSWORD)
        .await
        .unwrap_err();
    assert!(err.is_partial_migration());

    // The account exists but cannot see the guest's ideas yet
    let account = sessions.require().unwrap();
    assert_eq!(account.kind(), SessionKind::Credentialed);
    repo.fetch_all(&account).await.unwrap();
    assert!(repo.ideas().is_empty());

    assert_eq!(sessions.retry_migration(guest.user_id).await.unwrap(), 2);
    repo.fetch_all(&account).await.unwrap();
    assert_eq!(repo.ideas().len(), 2);
}

#[tokio::test]
async fn test_device_id_feeds_guest_metadata() {
    let store = MemoryPreferenceStore::new();
    let device = DeviceIdentityProvider::new(&store).get_or_create_device_id();
    assert!(device.is_persisted());

    let (sessions, _) = setup(PromotionMode::InPlace);
    let guest = sessions
        .sign_in_as_guest(Some(device.as_str()))
        .await
        .unwrap();
    assert_eq!(guest.metadata.device_id.as_deref(), Some(device.as_str()));

    let again = DeviceIdentityProvider::new(&store).get_or_create_device_id();
    assert_eq!(again, device);
}

#[tokio::test]
async fn test_views_render_repository_projection() {
    let (sessions, mut repo) = setup(PromotionMode::InPlace);
    let guest = sessions.sign_in_as_guest(Some("dev-1")).await.unwrap();
    for (title, tags) in [("Zebra app", "animals"), ("apple tracker", "food, apps"), ("Mango", "food")] {
        let input = IdeaInput::new(title, "").with_tags(sparkvault::validation::parse_tags(tags));
        repo.create(&guest, &input).await.unwrap();
    }
    repo.fetch_all(&guest).await.unwrap();

    let query = IdeaQuery::new("food").sorted_by(SortField::Title, SortOrder::Asc);
    let projected = repo.project(&query);
    let titles: Vec<&str> = projected.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["apple tracker", "Mango"]);

    for mode in ViewMode::ALL {
        let out = sparkvault::render_view(repo.ideas(), &query, mode);
        assert!(!out.contains("Zebra"));
        assert!(out.find("apple tracker").unwrap() < out.find("Mango").unwrap());
    }
}
