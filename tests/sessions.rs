use std::time::Duration;

use telegram_dice_bot::SessionStore;

#[tokio::test]
async fn issued_token_resolves_to_its_user() {
    let store = SessionStore::new(Duration::from_secs(60));
    let a = store.issue(10).await;
    let b = store.issue(20).await;

    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 32);
    assert_eq!(store.resolve(a.as_str()).await, Some(10));
    assert_eq!(store.resolve(b.as_str()).await, Some(20));
}

#[tokio::test]
async fn raw_user_id_is_not_a_session() {
    let store = SessionStore::new(Duration::from_secs(60));
    store.issue(10).await;
    assert_eq!(store.resolve("10").await, None);
}

#[tokio::test]
async fn revoked_token_stops_resolving() {
    let store = SessionStore::new(Duration::from_secs(60));
    let token = store.issue(10).await;
    assert!(store.revoke(token.as_str()).await);
    assert!(!store.revoke(token.as_str()).await);
    assert_eq!(store.resolve(token.as_str()).await, None);
}

#[test]
fn debug_output_hides_the_token() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = SessionStore::new(Duration::from_secs(60));
    let token = rt.block_on(store.issue(1));
    assert!(!format!("{:?}", token).contains(token.as_str()));
}
