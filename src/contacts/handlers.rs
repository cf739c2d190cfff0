use axum::{extract::State, http::StatusCode, routing::get, Router};
use tracing::instrument;

use super::{
    dto::{BirthdaysQuery, ContactCreate, ContactResponse, ContactUpdate, ListQuery},
    services,
};
use crate::{
    auth::extractors::CurrentUser,
    error::AppResult,
    extract::{Json, Path, Query},
    state::AppState,
};

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/contacts", get(list_contacts).post(create_contact))
        .route("/contacts/birthdays/upcoming", get(upcoming_birthdays))
        .route(
            "/contacts/:id",
            get(get_contact).put(update_contact).delete(remove_contact),
        )
}

fn responses(contacts: Vec<super::repo_types::Contact>) -> Vec<ContactResponse> {
    contacts.into_iter().map(ContactResponse::from).collect()
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Vec<ContactResponse>>> {
    let (page, filter) = q.into_parts()?;
    let contacts = services::list(state.contacts.as_ref(), &user, page, &filter).await?;
    Ok(Json(responses(contacts)))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ContactResponse>> {
    if let Some(cached) = state.contact_cache.get(id, user.id).await {
        return Ok(Json(cached));
    }
    let contact: ContactResponse = services::get(state.contacts.as_ref(), &user, id).await?.into();
    state.contact_cache.put(user.id, &contact).await;
    Ok(Json(contact))
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn create_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ContactCreate>,
) -> AppResult<(StatusCode, Json<ContactResponse>)> {
    let new = body.validate()?;
    let contact: ContactResponse = services::create(state.contacts.as_ref(), &user, new).await?.into();
    state.contact_cache.put(user.id, &contact).await;
    Ok((StatusCode::CREATED, Json(contact)))
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<ContactUpdate>,
) -> AppResult<Json<ContactResponse>> {
    let changes = body.validate()?;
    let contact: ContactResponse = services::update(state.contacts.as_ref(), &user, id, changes).await?.into();
    state.contact_cache.put(user.id, &contact).await;
    Ok(Json(contact))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn remove_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ContactResponse>> {
    let contact = services::remove(state.contacts.as_ref(), &user, id).await?;
    state.contact_cache.evict(id).await;
    Ok(Json(contact.into()))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn upcoming_birthdays(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<BirthdaysQuery>,
) -> AppResult<Json<Vec<ContactResponse>>> {
    let contacts = services::upcoming_birthdays(state.contacts.as_ref(), &user, q.days).await?;
    Ok(Json(responses(contacts)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use std::sync::Arc;

    use crate::testing::{send, SetFailingCache, TestApp};

    fn body(email: &str) -> serde_json::Value {
        json!({
            "name": "John",
            "surname": "Doe",
            "email": email,
            "phone": "123",
            "birthday": "1990-03-05",
            "additional_info": "friend"
        })
    }

    #[tokio::test]
    async fn create_then_get_is_served_from_cache() {
        let app = TestApp::new();
        let token = app.user_token("alice").await;

        let (status, created) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(body("john@doe.com"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();

        // Mutate the store behind the cache's back; the snapshot must win until TTL.
        app.contacts.rename_out_of_band(id, "Changed");

        let (status, got) = send(&app.router, "GET", &format!("/api/contacts/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(got["name"], "John");
        assert_eq!(got, created);
    }

    #[tokio::test]
    async fn update_overwrites_cached_snapshot() {
        let app = TestApp::new();
        let token = app.user_token("alice").await;
        let (_, created) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(body("john@doe.com"))).await;
        let id = created["id"].as_i64().unwrap();

        let (status, updated) = send(
            &app.router,
            "PUT",
            &format!("/api/contacts/{id}"),
            Some(&token),
            Some(json!({ "name": "Johnny" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Johnny");
        assert_eq!(updated["phone"], "123");

        let (_, got) = send(&app.router, "GET", &format!("/api/contacts/{id}"), Some(&token), None).await;
        assert_eq!(got["name"], "Johnny");
    }

    #[tokio::test]
    async fn deleted_contact_is_not_resurrected_by_cache() {
        let app = TestApp::new();
        let token = app.user_token("alice").await;
        let (_, created) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(body("john@doe.com"))).await;
        let id = created["id"].as_i64().unwrap();
        let path = format!("/api/contacts/{id}");

        send(&app.router, "GET", &path, Some(&token), None).await;
        let (status, deleted) = send(&app.router, "DELETE", &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["id"], id);

        let (status, _) = send(&app.router, "GET", &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app.router, "DELETE", &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cached_contact_is_not_served_to_another_user() {
        let app = TestApp::new();
        let alice = app.user_token("alice").await;
        let bob = app.user_token("bob").await;
        let (_, created) = send(&app.router, "POST", "/api/contacts", Some(&alice), Some(body("john@doe.com"))).await;
        let path = format!("/api/contacts/{}", created["id"]);

        let (status, _) = send(&app.router, "GET", &path, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app.router, "DELETE", &path, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = send(&app.router, "GET", "/api/contacts", Some(&bob), None).await;
        assert_eq!(list.as_array().unwrap().len(), 0);

        let (status, _) = send(&app.router, "GET", &path, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let app = TestApp::new();
        let token = app.user_token("alice").await;
        send(&app.router, "POST", "/api/contacts", Some(&token), Some(body("john@doe.com"))).await;
        let (status, err) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(body("john@doe.com"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(err["detail"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn update_is_visible_when_cache_rejects_writes() {
        let cache = Arc::new(SetFailingCache::default());
        let app = TestApp::with_cache(cache.clone());
        let token = app.user_token("alice").await;
        let (_, created) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(body("john@doe.com"))).await;
        let path = format!("/api/contacts/{}", created["id"]);

        cache.fail_sets();
        let (status, updated) = send(&app.router, "PUT", &path, Some(&token), Some(json!({ "name": "Johnny" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Johnny");

        let (status, got) = send(&app.router, "GET", &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(got["name"], "Johnny");
    }

    #[tokio::test]
    async fn unavailable_cache_falls_back_to_store() {
        let app = TestApp::with_failing_cache();
        let token = app.user_token("alice").await;
        let (status, created) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(body("john@doe.com"))).await;
        assert_eq!(status, StatusCode::CREATED);

        let path = format!("/api/contacts/{}", created["id"]);
        let (status, got) = send(&app.router, "GET", &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(got["email"], "john@doe.com");
        let (status, _) = send(&app.router, "DELETE", &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_input_gets_detail_body() {
        let app = TestApp::new();
        let token = app.user_token("alice").await;
        for path in [
            "/api/contacts?limit=abc",
            "/api/contacts/birthdays/upcoming?days=-1",
            "/api/contacts/abc",
        ] {
            let (status, err) = send(&app.router, "GET", path, Some(&token), None).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{path}");
            assert!(err["detail"].is_string(), "{path}");
        }

        let (status, err) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(json!({ "name": "John" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err["detail"].is_string());
    }

    #[tokio::test]
    async fn requires_authentication() {
        let app = TestApp::new();
        let (status, _) = send(&app.router, "GET", "/api/contacts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app.router, "GET", "/api/contacts", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_body_is_unprocessable() {
        let app = TestApp::new();
        let token = app.user_token("alice").await;
        let mut bad = body("john@doe.com");
        bad["name"] = json!("");
        let (status, _) = send(&app.router, "POST", "/api/contacts", Some(&token), Some(bad)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn upcoming_birthdays_route_scopes_to_owner() {
        let app = TestApp::new();
        let alice = app.user_token("alice").await;
        let bob = app.user_token("bob").await;
        let today = time::OffsetDateTime::now_utc().date();
        let mut b = body("soon@doe.com");
        b["birthday"] = json!(format!("2000-{:02}-{:02}", u8::from(today.month()), today.day()));
        let (status, _) = send(&app.router, "POST", "/api/contacts", Some(&alice), Some(b)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, mine) = send(&app.router, "GET", "/api/contacts/birthdays/upcoming?days=7", Some(&alice), None).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);
        let (_, theirs) = send(&app.router, "GET", "/api/contacts/birthdays/upcoming", Some(&bob), None).await;
        assert_eq!(theirs.as_array().unwrap().len(), 0);
    }
}
