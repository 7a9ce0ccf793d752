//! Integration tests for the marketplace API
//!
//! These tests verify the entire application stack including:
//! - HTTP routing and authentication
//! - Request/response handling
//! - Database operations
//! - Error handling

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::{NamedTempFile, TempDir};
use tower::ServiceExt;

// Import from the main crate
use nestmate::auth::Claims;
use nestmate::config::{Config, DuplicatePolicy};
use nestmate::database::{init_db, AppState};
use nestmate::route::create_app;

const SECRET: &str = "test-secret";

struct TestApp {
    app: Router,
    uploads: TempDir,
    _db_file: NamedTempFile,
}

/// Helper function to create a test application with a temporary database
fn setup_test_app() -> TestApp {
    setup_with_policy(DuplicatePolicy::Ignore)
}

fn setup_with_policy(policy: DuplicatePolicy) -> TestApp {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let uploads = tempfile::tempdir().expect("Failed to create upload dir");

    let db = init_db(temp_db.path().to_str().unwrap()).expect("Failed to initialize test database");
    let config = Config {
        jwt_secret: SECRET.to_string(),
        upload_dir: uploads.path().to_path_buf(),
        contact_duplicates: policy,
        ..Config::default()
    };

    TestApp {
        app: create_app(AppState::new(db, &config)),
        uploads,
        _db_file: temp_db,
    }
}

/// Mints a bearer token the way the login service does
fn token_for(user_id: &str) -> String {
    let claims = Claims {
        id: user_id.to_string(),
        role: Some("user".to_string()),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

/// Sends one request, authenticated as `user` when given
async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("Authorization", format!("Bearer {}", token_for(user)));
    }
    let body = match body {
        Some(payload) => {
            request = request.header("content-type", "application/json");
            Body::from(payload.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, response_json(response.into_body()).await)
}

fn flat_payload(name: &str, lat: f64, lng: f64) -> Value {
    json!({
        "apartmentName": name,
        "rentPrice": 15000,
        "location": {
            "city": "Pune",
            "locality": "Kothrud",
            "coordinates": { "lat": lat, "lng": lng }
        }
    })
}

async fn create(app: &Router, path: &str, owner: &str, payload: Value) -> String {
    let (status, body) = send(app, "POST", path, Some(owner), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_and_get_listing() {
    let t = setup_test_app();

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/flats",
        Some("owner_o"),
        Some(flat_payload("Sunrise Residency", 18.52, 73.85)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ownerId"], "owner_o");
    assert_eq!(body["kind"], "flat");
    assert_eq!(body["status"], "available");
    assert_eq!(body["rentPrice"], 15000);
    assert_eq!(body["contactedUsers"], json!([]));
    assert_eq!(body["createdAt"], body["updatedAt"]);

    let id = body["id"].as_str().unwrap();
    assert_eq!(id.len(), 16);

    // Reading is public
    let (status, fetched) = send(&t.app, "GET", &format!("/api/flats/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["apartmentName"], "Sunrise Residency");

    // Listings of one kind are not visible under another
    let (status, body) = send(&t.app, "GET", &format!("/api/messes/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, mine) = send(&t.app, "GET", "/api/flats/mine", Some("owner_o"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (_, theirs) = send(&t.app, "GET", "/api/flats/mine", Some("someone_else"), None).await;
    assert!(theirs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_listing_validation() {
    let t = setup_test_app();

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/messes",
        Some("owner_o"),
        Some(json!({ "messName": "No Pin", "location": { "city": "Pune" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/services",
        Some("owner_o"),
        Some(json!({ "location": { "coordinates": { "lat": 18.5, "lng": 73.8 } } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/services",
        Some("owner_o"),
        Some(json!({
            "name": "Sparkle",
            "status": "rented",
            "location": { "coordinates": { "lat": 18.5, "lng": 73.8 } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let t = setup_test_app();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/flats")
                .header("content-type", "application/json")
                .header("Authorization", format!("Bearer {}", token_for("owner_o")))
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn test_update_listing_owner_only() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;
    let uri = format!("/api/flats/{id}");

    let (status, body) = send(&t.app, "PUT", &uri, Some("intruder"), Some(json!({ "rentPrice": 1 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = send(
        &t.app,
        "PUT",
        &uri,
        Some("owner_o"),
        Some(json!({ "rentPrice": 16000, "status": "rented", "ownerId": "intruder" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rentPrice"], 16000);
    assert_eq!(body["status"], "rented");
    assert_eq!(body["ownerId"], "owner_o");
    assert_eq!(body["apartmentName"], "Sunrise");
    assert_eq!(body["version"], 1);

    // A rented flat no longer shows up when browsing
    let (_, listed) = send(&t.app, "GET", "/api/flats", None, None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_and_delete_remove_dropped_images() {
    let t = setup_test_app();
    for name in ["a.jpg", "b.jpg"] {
        std::fs::write(t.uploads.path().join(name), b"jpeg").unwrap();
    }

    let mut payload = flat_payload("Sunrise", 18.52, 73.85);
    payload["images"] = json!(["a.jpg", "b.jpg"]);
    let id = create(&t.app, "/api/flats", "owner_o", payload).await;
    let uri = format!("/api/flats/{id}");

    let (status, body) = send(&t.app, "PUT", &uri, Some("owner_o"), Some(json!({ "images": ["b.jpg"] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"], json!(["b.jpg"]));
    assert!(!t.uploads.path().join("a.jpg").exists());
    assert!(t.uploads.path().join("b.jpg").exists());

    let (status, _) = send(&t.app, "DELETE", &uri, Some("intruder"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&t.app, "DELETE", &uri, Some("owner_o"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "flat deleted");
    assert_eq!(body["deletedId"], id.as_str());
    assert!(!t.uploads.path().join("b.jpg").exists());

    let (status, _) = send(&t.app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_shared_image_names_survive_other_listings() {
    let t = setup_test_app();
    std::fs::write(t.uploads.path().join("victim.jpg"), b"jpeg").unwrap();

    let mut victim = flat_payload("Sunrise", 18.52, 73.85);
    victim["images"] = json!(["victim.jpg"]);
    create(&t.app, "/api/flats", "owner_v", victim).await;

    // Another user claims the same filename on a listing of another kind
    let mut claimed = json!({
        "messName": "Annapurna",
        "location": { "coordinates": { "lat": 18.52, "lng": 73.85 } }
    });
    claimed["images"] = json!(["victim.jpg"]);
    let mess_id = create(&t.app, "/api/messes", "owner_a", claimed).await;

    let (status, _) = send(
        &t.app,
        "PUT",
        &format!("/api/messes/{mess_id}"),
        Some("owner_a"),
        Some(json!({ "images": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(t.uploads.path().join("victim.jpg").exists());

    let mut copycat = flat_payload("Copycat", 18.52, 73.85);
    copycat["images"] = json!(["victim.jpg"]);
    let copy_id = create(&t.app, "/api/flats", "owner_a", copycat).await;

    let (status, _) = send(&t.app, "DELETE", &format!("/api/flats/{copy_id}"), Some("owner_a"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(t.uploads.path().join("victim.jpg").exists());
}

#[tokio::test]
async fn test_contact_confirm_rate_flow() {
    let t = setup_test_app();

    let (status, _) = send(
        &t.app,
        "PUT",
        "/api/users/me",
        Some("owner_o"),
        Some(json!({ "name": "Omkar", "phone": "919800000000" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    send(&t.app, "PUT", "/api/users/me", Some("user_u"), Some(json!({ "name": "Umesh" }))).await;

    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;

    // Contact
    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/flats/{id}/contact"),
        Some("user_u"),
        Some(json!({ "message": "Is it available?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Contact initiated");
    assert_eq!(body["providerPhone"], "919800000000");
    assert_eq!(body["contact"]["contactedId"], "owner_o");

    let (_, pending) = send(&t.app, "GET", "/api/ratings/pending", Some("user_u"), None).await;
    assert_eq!(pending, json!([]));

    // Only the owner sees who contacted
    let (status, _) = send(&t.app, "GET", &format!("/api/flats/{id}/contacted"), Some("user_u"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, entries) = send(&t.app, "GET", &format!("/api/flats/{id}/contacted"), Some("owner_o"), None).await;
    assert_eq!(entries[0]["userId"], "user_u");
    assert_eq!(entries[0]["name"], "Umesh");
    assert_eq!(entries[0]["confirmed"], false);

    // Confirm
    let (status, entry) = send(
        &t.app,
        "PUT",
        &format!("/api/flats/{id}/contacted/user_u/confirm"),
        Some("owner_o"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["confirmed"], true);

    let (_, pending) = send(&t.app, "GET", "/api/ratings/pending", Some("user_u"), None).await;
    assert_eq!(
        pending,
        json!([{ "type": "flat", "targetId": id, "displayName": "Sunrise" }])
    );

    // Rate
    let rating = json!({ "type": "flat", "targetId": id, "rating": 4, "comment": "good" });
    let (status, body) = send(&t.app, "POST", "/api/ratings", Some("user_u"), Some(rating.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["verified"], true);
    assert_eq!(body["userId"], "user_u");

    let (status, body) = send(&t.app, "POST", "/api/ratings", Some("user_u"), Some(rating)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "duplicate_rating");

    let (_, pending) = send(&t.app, "GET", "/api/ratings/pending", Some("user_u"), None).await;
    assert_eq!(pending, json!([]));

    let (status, ratings) = send(&t.app, "GET", &format!("/api/ratings/flat/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ratings.as_array().unwrap().len(), 1);

    let (_, by_user) = send(&t.app, "GET", "/api/ratings/user/user_u", None, None).await;
    assert_eq!(by_user[0]["targetId"], id.as_str());

    let (_, summary) = send(&t.app, "GET", &format!("/api/ratings/flat/{id}/summary"), None, None).await;
    assert_eq!(summary, json!({ "average": 4.0, "count": 1 }));
}

#[tokio::test]
async fn test_rating_errors() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/messes", "owner_o", json!({
        "messName": "Annapurna",
        "location": { "coordinates": { "lat": 18.52, "lng": 73.85 } }
    }))
    .await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/ratings",
        Some("user_u"),
        Some(json!({ "type": "mess", "targetId": id, "rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_eligible");

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/ratings",
        Some("user_u"),
        Some(json!({ "type": "mess", "targetId": "missingMess00000", "rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "target_not_found");

    send(&t.app, "POST", &format!("/api/messes/{id}/contact"), Some("user_u"), None).await;
    send(&t.app, "POST", &format!("/api/messes/{id}/contacted/user_u/confirm"), Some("owner_o"), None).await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/ratings",
        Some("user_u"),
        Some(json!({ "type": "mess", "targetId": id, "rating": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_rating_value");

    let (status, _) = send(&t.app, "GET", "/api/ratings/castle/whatever", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, summary) = send(&t.app, "GET", &format!("/api/ratings/mess/{id}/summary"), None, None).await;
    assert_eq!(summary, json!({ "average": "No ratings", "count": 0 }));
}

#[tokio::test]
async fn test_update_and_delete_rating() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;
    send(&t.app, "POST", &format!("/api/flats/{id}/contact"), Some("user_u"), None).await;
    send(&t.app, "PUT", &format!("/api/flats/{id}/contacted/user_u/confirm"), Some("owner_o"), None).await;

    let (_, created) = send(
        &t.app,
        "POST",
        "/api/ratings",
        Some("user_u"),
        Some(json!({ "type": "flat", "targetId": id, "rating": 3 })),
    )
    .await;
    let rating_uri = format!("/api/ratings/{}", created["id"].as_str().unwrap());

    let (status, _) = send(&t.app, "PUT", &rating_uri, Some("owner_o"), Some(json!({ "rating": 1 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &t.app,
        "PUT",
        &rating_uri,
        Some("user_u"),
        Some(json!({ "rating": 5, "comment": "better" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], 5);
    assert_eq!(body["comment"], "better");

    let (status, _) = send(&t.app, "DELETE", &rating_uri, Some("user_u"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, summary) = send(&t.app, "GET", &format!("/api/ratings/flat/{id}/summary"), None, None).await;
    assert_eq!(summary["count"], 0);
}

#[tokio::test]
async fn test_direct_contact_rules() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/services", "owner_o", json!({
        "name": "Sparkle Cleaning",
        "location": { "coordinates": { "lat": 18.52, "lng": 73.85 } }
    }))
    .await;
    let contact_uri = format!("/api/services/{id}/contact");

    let (status, body) = send(&t.app, "POST", &contact_uri, Some("owner_o"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "self_contact");

    let (status, body) = send(&t.app, "POST", &contact_uri, Some("user_u"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["providerPhone"].is_null());

    let (status, body) = send(&t.app, "POST", &contact_uri, Some("user_u"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "already_contacted");

    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/services/{id}/contacted/nobody/confirm"),
        Some("owner_o"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "contact_not_found");
}

#[tokio::test]
async fn test_remove_contact_entry() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;
    for user in ["user_a", "user_b"] {
        send(&t.app, "POST", &format!("/api/flats/{id}/contact"), Some(user), None).await;
    }

    let (status, _) = send(&t.app, "DELETE", &format!("/api/flats/{id}/contacted/user_a"), Some("user_b"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The contacted user may withdraw their own entry
    let (status, remaining) = send(&t.app, "DELETE", &format!("/api/flats/{id}/contacted/user_a"), Some("user_a"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["userId"], "user_b");

    let (status, remaining) = send(&t.app, "DELETE", &format!("/api/flats/{id}/contacted/user_b"), Some("owner_o"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(remaining, json!([]));

    let (status, _) = send(&t.app, "DELETE", &format!("/api/flats/{id}/contacted/user_b"), Some("owner_o"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generic_contacts_ignore_repeats_by_default() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;

    for message in ["first", "second"] {
        let (status, body) = send(
            &t.app,
            "POST",
            "/api/contacts",
            Some("user_u"),
            Some(json!({ "type": "flat", "listingId": id, "message": message })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
    }

    let (_, entries) = send(&t.app, "GET", &format!("/api/flats/{id}/contacted"), Some("owner_o"), None).await;
    assert_eq!(entries.as_array().unwrap().len(), 1);

    let (_, page) = send(&t.app, "GET", "/api/contacts?page=1&limit=1", Some("user_u"), None).await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["message"], "first");

    let (_, page) = send(&t.app, "GET", "/api/contacts?page=2&limit=1", Some("user_u"), None).await;
    assert_eq!(page[0]["message"], "second");

    // Editing and deleting belong to the sender
    let uri = format!("/api/contacts/{}", page[0]["id"].as_str().unwrap());
    let (status, _) = send(&t.app, "PUT", &uri, Some("owner_o"), Some(json!({ "message": "x" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&t.app, "PUT", &uri, Some("user_u"), Some(json!({ "status": "responded" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "responded");

    let (status, _) = send(&t.app, "DELETE", &uri, Some("user_u"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, all) = send(&t.app, "GET", "/api/contacts", Some("user_u"), None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_contacts_page_far_past_the_end() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;
    send(
        &t.app,
        "POST",
        "/api/contacts",
        Some("user_u"),
        Some(json!({ "type": "flat", "listingId": id })),
    )
    .await;

    let uri = format!("/api/contacts?page={}&limit=100", usize::MAX);
    let (status, page) = send(&t.app, "GET", &uri, Some("user_u"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page, json!([]));
}

#[tokio::test]
async fn test_generic_contacts_reject_policy() {
    let t = setup_with_policy(DuplicatePolicy::Reject);
    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;
    let payload = json!({ "type": "flat", "listingId": id });

    let (status, _) = send(&t.app, "POST", "/api/contacts", Some("user_u"), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&t.app, "POST", "/api/contacts", Some("user_u"), Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "already_contacted");
}

#[tokio::test]
async fn test_nearby_and_search() {
    let t = setup_test_app();
    let lat = 18.52;
    let lng = 73.85;

    let flat_id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", lat, lng)).await;
    for (name, km) in [("Near", 0.8), ("Far", 1.2)] {
        create(&t.app, "/api/messes", "owner_o", json!({
            "messName": name,
            "location": {
                "city": "Pune",
                "landmark": "MIT College",
                "coordinates": { "lat": lat + km / 111.19, "lng": lng }
            }
        }))
        .await;
    }

    let (status, found) = send(
        &t.app,
        "GET",
        &format!("/api/messes/nearby?lat={lat}&lng={lng}&radius=1"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["messName"], "Near");
    assert!((found[0]["distance"].as_f64().unwrap() - 0.8).abs() < 0.01);

    // The default radius is 1 km as well
    let (_, found) = send(&t.app, "GET", &format!("/api/messes/nearby?lat={lat}&lng={lng}"), None, None).await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let (status, body) = send(&t.app, "GET", "/api/messes/nearby?lat=18.52", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_coordinate");

    let (status, nearby) = send(&t.app, "GET", &format!("/api/flats/{flat_id}/nearby?radius=2"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(nearby["nearbyMesses"].as_array().unwrap().len(), 2);
    assert_eq!(nearby["nearbyServices"], json!([]));

    let (_, hits) = send(
        &t.app,
        "GET",
        &format!("/api/messes?search=mit%20college&lat={lat}&lng={lng}"),
        None,
        None,
    )
    .await;
    let names: Vec<_> = hits.as_array().unwrap().iter().map(|h| h["messName"].clone()).collect();
    assert_eq!(names, vec![json!("Near"), json!("Far")]);

    let (_, hits) = send(&t.app, "GET", "/api/messes?search=mit", None, None).await;
    assert_eq!(hits, json!([]));
}

#[tokio::test]
async fn test_concurrent_contacts_are_all_recorded() {
    let t = setup_test_app();
    let id = create(&t.app, "/api/flats", "owner_o", flat_payload("Sunrise", 18.52, 73.85)).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let app = t.app.clone();
        let uri = format!("/api/flats/{id}/contact");
        handles.push(tokio::spawn(async move {
            let user = format!("user_{i}");
            send(&app, "POST", &uri, Some(&user), None).await.0
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let (_, entries) = send(&t.app, "GET", &format!("/api/flats/{id}/contacted"), Some("owner_o"), None).await;
    assert_eq!(entries.as_array().unwrap().len(), 16);
}

fn requirement_payload(location: &str) -> Value {
    json!({
        "forWhom": "working female",
        "location": location,
        "maxRent": 12000,
        "shiftingDate": "2025-06-01",
        "description": "1BHK close to the IT park"
    })
}

#[tokio::test]
async fn test_requirement_validation() {
    let t = setup_test_app();

    let mut missing = requirement_payload("Baner");
    missing.as_object_mut().unwrap().remove("maxRent");
    let (status, body) = send(&t.app, "POST", "/api/requirements", Some("seeker_s"), Some(missing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    assert_eq!(body["error"], "All fields are required");

    let mut unknown = requirement_payload("Baner");
    unknown["forWhom"] = json!("family");
    let (status, body) = send(&t.app, "POST", "/api/requirements", Some("seeker_s"), Some(unknown)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let mut undated = requirement_payload("Baner");
    undated["shiftingDate"] = json!("soon");
    let (status, _) = send(&t.app, "POST", "/api/requirements", Some("seeker_s"), Some(undated)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, "POST", "/api/requirements", None, Some(requirement_payload("Baner"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_requirement_lifecycle() {
    let t = setup_test_app();

    let (status, posted) = send(
        &t.app,
        "POST",
        "/api/requirements",
        Some("seeker_s"),
        Some(requirement_payload("Baner")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(posted["forWhom"], "working female");
    assert_eq!(posted["fulfilled"], false);
    let id = posted["id"].as_str().unwrap().to_string();

    send(&t.app, "POST", "/api/requirements", Some("other_o"), Some(requirement_payload("Wakad"))).await;

    // Open requirements are public
    let (status, open) = send(&t.app, "GET", "/api/requirements/all", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open.as_array().unwrap().len(), 2);

    let (_, mine) = send(&t.app, "GET", "/api/requirements", Some("seeker_s"), None).await;
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["location"], "Baner");

    let uri = format!("/api/requirements/{id}");
    let (status, body) = send(&t.app, "PUT", &uri, Some("other_o"), Some(json!({ "maxRent": 1 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
    let (status, _) = send(&t.app, "DELETE", &uri, Some("other_o"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = send(
        &t.app,
        "PUT",
        &uri,
        Some("seeker_s"),
        Some(json!({ "fulfilled": true, "maxRent": 14000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["fulfilled"], true);
    assert_eq!(updated["maxRent"], 14000.0);

    let (_, open) = send(&t.app, "GET", "/api/requirements/all", None, None).await;
    let open = open.as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["location"], "Wakad");

    // Fulfilled ones stay in the poster's own list
    let (_, mine) = send(&t.app, "GET", "/api/requirements", Some("seeker_s"), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, body) = send(&t.app, "DELETE", &uri, Some("seeker_s"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Requirement deleted");

    let (status, _) = send(&t.app, "DELETE", &uri, Some("seeker_s"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, mine) = send(&t.app, "GET", "/api/requirements", Some("seeker_s"), None).await;
    assert_eq!(mine, json!([]));
}
