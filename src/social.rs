//! Profiles and the friend graph
//!
//! Direct reads and writes against the document tree:
//!
//! - `users/{uid}`: profile and aggregate statistics
//! - `friend_requests/{to}/{from}`: `{status: "pending"}`
//! - `friends/{a}/{b}`: `{username, email}` of `b`, written in both directions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthenticatedSession;
use crate::error::GhostError;
use crate::persistence::{DocumentStore, TreePath};
use crate::types::{AggregateSnapshot, UserId, UserProfile, UserSummary};

/// Status of a friend request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FriendRequest {
    status: RequestStatus,
}

/// Contact details stored under `friends/{a}/{b}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FriendEntry {
    username: String,
    email: String,
}

/// Create the profile document for a newly signed-up user, with zeroed statistics
pub async fn create_profile<S>(
    store: &S,
    session: &AuthenticatedSession,
    name: &str,
) -> Result<UserProfile, GhostError>
where
    S: DocumentStore + ?Sized,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(GhostError::InvalidInput("name must not be empty".to_string()));
    }

    let profile = UserProfile {
        name: name.to_string(),
        email: session.email.clone(),
        username: name.to_string(),
        stats: AggregateSnapshot::default(),
    };
    store
        .set(&TreePath::user(&session.uid), serde_json::to_value(&profile)?)
        .await?;
    log::info!("created profile for {}", session.uid);
    Ok(profile)
}

/// Profile of any user
pub async fn profile<S>(store: &S, uid: &UserId) -> Result<UserProfile, GhostError>
where
    S: DocumentStore + ?Sized,
{
    let path = TreePath::user(uid);
    let value = store
        .get(&path)
        .await?
        .ok_or_else(|| GhostError::NotFound(path.to_string()))?;
    Ok(serde_json::from_value(value)?)
}

/// Users whose username equals `username` exactly
pub async fn find_by_username<S>(store: &S, username: &str) -> Result<Vec<UserSummary>, GhostError>
where
    S: DocumentStore + ?Sized,
{
    let Some(Value::Object(users)) = store.get(&TreePath::users()).await? else {
        return Ok(Vec::new());
    };

    let mut found: Vec<UserSummary> = users
        .iter()
        .filter_map(|(uid, doc)| summary_from_doc(uid, doc))
        .filter(|user| user.username == username)
        .collect();
    found.sort_by(|a, b| a.uid.cmp(&b.uid));
    Ok(found)
}

/// Users whose username starts with `prefix`, leaving out the signed-in user
/// and anyone who is already their friend. Ordered by username.
pub async fn search_users<S>(
    store: &S,
    session: &AuthenticatedSession,
    prefix: &str,
) -> Result<Vec<UserSummary>, GhostError>
where
    S: DocumentStore + ?Sized,
{
    let Some(Value::Object(users)) = store.get(&TreePath::users()).await? else {
        return Ok(Vec::new());
    };
    let friends = match store.get(&TreePath::friends(&session.uid)).await? {
        Some(Value::Object(entries)) => entries,
        _ => Map::new(),
    };

    let mut found: Vec<UserSummary> = users
        .iter()
        .filter(|(uid, _)| uid.as_str() != session.uid.as_str() && !friends.contains_key(*uid))
        .filter_map(|(uid, doc)| summary_from_doc(uid, doc))
        .filter(|user| user.username.starts_with(prefix))
        .collect();
    found.sort_by(|a, b| a.username.cmp(&b.username).then_with(|| a.uid.cmp(&b.uid)));
    log::debug!("search {prefix:?} by {}: {} users", session.uid, found.len());
    Ok(found)
}

/// Ask `to` to become friends with the signed-in user
pub async fn send_friend_request<S>(
    store: &S,
    session: &AuthenticatedSession,
    to: &UserId,
) -> Result<(), GhostError>
where
    S: DocumentStore + ?Sized,
{
    if *to == session.uid {
        return Err(GhostError::InvalidInput(
            "cannot send a friend request to yourself".to_string(),
        ));
    }
    if store.get(&TreePath::user(to)).await?.is_none() {
        return Err(GhostError::NotFound(TreePath::user(to).to_string()));
    }

    let request = FriendRequest {
        status: RequestStatus::Pending,
    };
    store
        .set(
            &TreePath::friend_requests(to).child(session.uid.as_str()),
            serde_json::to_value(&request)?,
        )
        .await?;
    log::info!("friend request {} -> {to}", session.uid);
    Ok(())
}

/// Users with a pending request to the signed-in user
pub async fn pending_requests<S>(
    store: &S,
    session: &AuthenticatedSession,
) -> Result<Vec<UserSummary>, GhostError>
where
    S: DocumentStore + ?Sized,
{
    let Some(Value::Object(requests)) = store.get(&TreePath::friend_requests(&session.uid)).await?
    else {
        return Ok(Vec::new());
    };

    let mut senders = Vec::new();
    for (from, request) in requests {
        match serde_json::from_value::<FriendRequest>(request) {
            Ok(r) if r.status == RequestStatus::Pending => {}
            Ok(_) => continue,
            Err(e) => {
                log::warn!("skipping unreadable friend request from {from}: {e}");
                continue;
            }
        }

        let uid = UserId::new(from);
        match store.get(&TreePath::user(&uid)).await? {
            Some(doc) => {
                if let Some(summary) = summary_from_doc(uid.as_str(), &doc) {
                    senders.push(summary);
                }
            }
            None => log::warn!("friend request from unknown user {uid}"),
        }
    }
    senders.sort_by(|a, b| a.uid.cmp(&b.uid));
    Ok(senders)
}

/// Number of requests waiting for the signed-in user
pub async fn friend_request_count<S>(
    store: &S,
    session: &AuthenticatedSession,
) -> Result<usize, GhostError>
where
    S: DocumentStore + ?Sized,
{
    match store.get(&TreePath::friend_requests(&session.uid)).await? {
        Some(Value::Object(requests)) => Ok(requests.len()),
        _ => Ok(0),
    }
}

/// Accept or decline the request `from` sent to the signed-in user.
///
/// The request is removed either way. Accepting records the friendship in
/// both users' friend lists.
pub async fn respond_to_request<S>(
    store: &S,
    session: &AuthenticatedSession,
    from: &UserId,
    accept: bool,
) -> Result<(), GhostError>
where
    S: DocumentStore + ?Sized,
{
    let request_path = TreePath::friend_requests(&session.uid).child(from.as_str());
    if store.get(&request_path).await?.is_none() {
        return Err(GhostError::NotFound(request_path.to_string()));
    }
    store.remove(&request_path).await?;

    if !accept {
        log::info!("{} declined friend request from {from}", session.uid);
        return Ok(());
    }

    let sender = profile(store, from).await?;
    let me = FriendEntry {
        username: session.public_name().to_string(),
        email: session.email.clone(),
    };
    let them = FriendEntry {
        username: sender.username,
        email: sender.email,
    };

    store
        .set(
            &TreePath::friends(&session.uid).child(from.as_str()),
            serde_json::to_value(&them)?,
        )
        .await?;
    store
        .set(
            &TreePath::friends(from).child(session.uid.as_str()),
            serde_json::to_value(&me)?,
        )
        .await?;
    log::info!("{} and {from} are now friends", session.uid);
    Ok(())
}

/// Friends of the signed-in user
pub async fn friends<S>(
    store: &S,
    session: &AuthenticatedSession,
) -> Result<Vec<UserSummary>, GhostError>
where
    S: DocumentStore + ?Sized,
{
    let Some(Value::Object(entries)) = store.get(&TreePath::friends(&session.uid)).await? else {
        return Ok(Vec::new());
    };

    let mut list: Vec<UserSummary> = entries
        .iter()
        .filter_map(|(uid, doc)| summary_from_doc(uid, doc))
        .collect();
    list.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(list)
}

/// Aggregate statistics of a friend
pub async fn friend_stats<S>(
    store: &S,
    session: &AuthenticatedSession,
    friend: &UserId,
) -> Result<AggregateSnapshot, GhostError>
where
    S: DocumentStore + ?Sized,
{
    let link = TreePath::friends(&session.uid).child(friend.as_str());
    if store.get(&link).await?.is_none() {
        return Err(GhostError::NotFound(link.to_string()));
    }
    Ok(profile(store, friend).await?.stats)
}

/// Statistics of the signed-in user
pub async fn my_stats<S>(
    store: &S,
    session: &AuthenticatedSession,
) -> Result<AggregateSnapshot, GhostError>
where
    S: DocumentStore + ?Sized,
{
    Ok(profile(store, &session.uid).await?.stats)
}

fn summary_from_doc(uid: &str, doc: &Value) -> Option<UserSummary> {
    let username = doc.get("username")?.as_str()?;
    let email = doc.get("email").and_then(Value::as_str).unwrap_or_default();
    Some(UserSummary {
        uid: UserId::new(uid),
        username: username.to_string(),
        email: email.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::types::Period;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ada() -> AuthenticatedSession {
        AuthenticatedSession::new("ada", "ada@example.com").with_display_name("ada")
    }

    fn bob() -> AuthenticatedSession {
        AuthenticatedSession::new("bob", "bob@example.com").with_display_name("bob")
    }

    async fn store_with_users() -> MemoryStore {
        let store = MemoryStore::new();
        create_profile(&store, &ada(), "ada").await.unwrap();
        create_profile(&store, &bob(), "bob").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_profile_zeroes_stats() {
        let store = store_with_users().await;
        let profile = profile(&store, &UserId::new("ada")).await.unwrap();

        assert_eq!(profile.username, "ada");
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.stats, AggregateSnapshot::default());

        let doc = store.get(&TreePath::user(&UserId::new("ada"))).await.unwrap().unwrap();
        assert_eq!(doc["today_mileage"], 0.0);
        assert_eq!(doc["fastest_all_time_speed"], 0.0);
    }

    #[tokio::test]
    async fn test_create_profile_rejects_blank_name() {
        let store = MemoryStore::new();
        let result = create_profile(&store, &ada(), "   ").await;
        assert!(matches!(result, Err(GhostError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_find_by_username_is_exact() {
        let store = store_with_users().await;

        let found = find_by_username(&store, "bob").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uid, UserId::new("bob"));

        assert!(find_by_username(&store, "bo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_users_by_prefix_skips_self_and_friends() {
        let store = store_with_users().await;
        let bea = AuthenticatedSession::new("bea", "bea@example.com");
        let cal = AuthenticatedSession::new("cal", "cal@example.com");
        create_profile(&store, &bea, "bea").await.unwrap();
        create_profile(&store, &cal, "cal").await.unwrap();

        let names = |users: Vec<UserSummary>| -> Vec<String> {
            users.into_iter().map(|u| u.username).collect()
        };

        let found = search_users(&store, &bob(), "b").await.unwrap();
        assert_eq!(names(found), vec!["bea"]);

        send_friend_request(&store, &ada(), &UserId::new("bob")).await.unwrap();
        respond_to_request(&store, &bob(), &UserId::new("ada"), true)
            .await
            .unwrap();

        let everyone = search_users(&store, &bob(), "").await.unwrap();
        assert_eq!(names(everyone), vec!["bea", "cal"]);

        let for_ada = search_users(&store, &ada(), "b").await.unwrap();
        assert_eq!(names(for_ada), vec!["bea"]);
        assert!(search_users(&store, &ada(), "z").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_requests_skip_unreadable_entries() {
        let store = store_with_users().await;
        send_friend_request(&store, &ada(), &UserId::new("bob")).await.unwrap();
        store
            .set(
                &TreePath::friend_requests(&UserId::new("bob")).child("carol"),
                json!("garbage"),
            )
            .await
            .unwrap();

        let pending = pending_requests(&store, &bob()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].uid, UserId::new("ada"));
    }

    #[tokio::test]
    async fn test_request_and_accept() {
        let store = store_with_users().await;

        send_friend_request(&store, &ada(), &UserId::new("bob")).await.unwrap();
        assert_eq!(friend_request_count(&store, &bob()).await.unwrap(), 1);

        let pending = pending_requests(&store, &bob()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].username, "ada");

        respond_to_request(&store, &bob(), &UserId::new("ada"), true)
            .await
            .unwrap();

        assert_eq!(friend_request_count(&store, &bob()).await.unwrap(), 0);
        let bobs = friends(&store, &bob()).await.unwrap();
        let adas = friends(&store, &ada()).await.unwrap();
        assert_eq!(bobs[0].uid, UserId::new("ada"));
        assert_eq!(adas[0].uid, UserId::new("bob"));
        assert_eq!(adas[0].email, "bob@example.com");
    }

    #[tokio::test]
    async fn test_decline_removes_request_only() {
        let store = store_with_users().await;
        send_friend_request(&store, &ada(), &UserId::new("bob")).await.unwrap();

        respond_to_request(&store, &bob(), &UserId::new("ada"), false)
            .await
            .unwrap();

        assert!(pending_requests(&store, &bob()).await.unwrap().is_empty());
        assert!(friends(&store, &bob()).await.unwrap().is_empty());
        assert!(friends(&store, &ada()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_to_self_or_unknown_user() {
        let store = store_with_users().await;

        let to_self = send_friend_request(&store, &ada(), &UserId::new("ada")).await;
        assert!(matches!(to_self, Err(GhostError::InvalidInput(_))));

        let unknown = send_friend_request(&store, &ada(), &UserId::new("carol")).await;
        assert!(matches!(unknown, Err(GhostError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_respond_without_request() {
        let store = store_with_users().await;
        let result = respond_to_request(&store, &bob(), &UserId::new("ada"), true).await;
        assert!(matches!(result, Err(GhostError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_friend_stats_requires_friendship() {
        let store = store_with_users().await;
        let bob_id = UserId::new("bob");

        let before = friend_stats(&store, &ada(), &bob_id).await;
        assert!(matches!(before, Err(GhostError::NotFound(_))));

        let mut fields = serde_json::Map::new();
        fields.insert("weekly_mileage".into(), json!(12.5));
        store.update(&TreePath::user(&bob_id), fields).await.unwrap();

        send_friend_request(&store, &ada(), &bob_id).await.unwrap();
        respond_to_request(&store, &bob(), &UserId::new("ada"), true)
            .await
            .unwrap();

        let stats = friend_stats(&store, &ada(), &bob_id).await.unwrap();
        assert_eq!(stats.view(Period::Week).miles, 12.5);
    }

    #[tokio::test]
    async fn test_my_stats() {
        let store = store_with_users().await;
        let stats = my_stats(&store, &ada()).await.unwrap();
        assert_eq!(stats.view(Period::Year).minutes, 0.0);
    }
}
