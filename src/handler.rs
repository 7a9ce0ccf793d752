//! HTTP request handlers for the marketplace API
//!
//! Handlers stay thin: they extract the caller, the listing kind and the
//! payload, call into the workflow modules and serialize the result. Any
//! `AppError` becomes a JSON error response.
//!
//! Listing routes are mounted once per kind; the kind reaches the handlers as
//! an `Extension<ListingKind>` set on the mounted router.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::blob;
use crate::config::DuplicatePolicy;
use crate::contact;
use crate::database::AppState;
use crate::error::AppError;
use crate::geo::Coordinate;
use crate::model::{
    Contact, ContactEntry, ContactInitiated, ContactPatch, ContactRequest, CreateContactRequest,
    CreateRatingRequest, ListParams, Listing, ListingDraft, ListingKind, ListingPatch,
    ListingWithDistance, NearbyListings, NearbyParams, PendingRating, ProfileRequest, Rating,
    RatingPatch, RatingSummary, Requirement, RequirementDraft, RequirementPatch, SearchParams,
    UserProfile,
};
use crate::rating;
use crate::requirement;
use crate::search;
use crate::store::{ListingStore, UserStore};

type JsonBody<T> = Result<Json<T>, JsonRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;

/// Creates or replaces the caller's profile
///
/// `PUT /api/users/me` with `{"name": "Asha", "phone": "919800000000"}`
pub async fn upsert_profile(
    State(state): State<AppState>,
    user: AuthUser,
    payload: JsonBody<ProfileRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let Json(payload) = payload?;
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }

    let profile = UserProfile {
        id: user.id,
        name: payload.name.trim().to_string(),
        phone: payload.phone,
    };
    UserStore::new(&state.db).upsert(&profile)?;
    Ok(Json(profile))
}

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    UserStore::new(&state.db)
        .find(&user.id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Profile".to_string()))
}

/// Browses the open listings of a kind
///
/// # Query Parameters
///
/// - `search` (optional) - Exact city, locality or landmark, case-insensitive
/// - `lat`, `lng` (optional, together) - Point of interest; results are then
///   annotated with `distance` in km and sorted nearest first
///
/// # Example Request
///
/// `GET /api/flats?search=kothrud&lat=18.52&lng=73.85`
pub async fn list_listings(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    params: QueryParams<SearchParams>,
) -> Result<Json<Vec<ListingWithDistance>>, AppError> {
    let Query(params) = params?;

    let poi = match (params.lat, params.lng) {
        (None, None) => None,
        (lat, lng) => Some(Coordinate::from_query(lat, lng)?),
    };

    let results = search::search_by_text(&state, kind, params.search.as_deref(), poi.as_ref())?;
    Ok(Json(results))
}

/// Open listings of a kind within a radius of a point
///
/// `GET /api/messes/nearby?lat=18.52&lng=73.85&radius=2`
///
/// `lat` and `lng` are required. `radius` defaults to the configured nearby
/// radius.
pub async fn nearby_listings(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    params: QueryParams<NearbyParams>,
) -> Result<Json<Vec<ListingWithDistance>>, AppError> {
    let Query(params) = params?;
    let poi = Coordinate::from_query(params.lat, params.lng)?;
    let radius = params.radius.unwrap_or(state.settings.nearby_radius_km);

    Ok(Json(search::nearby(&state, kind, &poi, radius)?))
}

/// Messes and services around a flat
///
/// `GET /api/flats/{id}/nearby?radius=1`
pub async fn flat_nearby(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: QueryParams<NearbyParams>,
) -> Result<Json<NearbyListings>, AppError> {
    let Query(params) = params?;
    let radius = params.radius.unwrap_or(state.settings.nearby_radius_km);

    Ok(Json(search::nearby_for_flat(&state, &id, radius)?))
}

/// Publishes a new listing owned by the caller
///
/// # Response
///
/// - **201 Created** - The stored listing
/// - **400 Bad Request** - Missing title or coordinates, or a status the kind does not use
pub async fn create_listing(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    user: AuthUser,
    payload: JsonBody<ListingDraft>,
) -> Result<(StatusCode, Json<Listing>), AppError> {
    let Json(draft) = payload?;

    let listing = Listing::create(kind, &user.id, draft, state.clock.now())?;
    ListingStore::new(&state.db).insert(&listing)?;

    tracing::info!(%kind, listing_id = %listing.id, owner_id = %user.id, "listing created");
    Ok((StatusCode::CREATED, Json(listing)))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    Path(id): Path<String>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(ListingStore::new(&state.db).find_by_id(kind, &id)?))
}

pub async fn list_my_listings(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    user: AuthUser,
) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(ListingStore::new(&state.db).find_by_owner(kind, &user.id)?))
}

/// Partially updates a listing
///
/// Only the owner may update. Images missing from a new `images` array are
/// deleted from upload storage once the update is stored, unless another
/// listing still references them.
///
/// # Response
///
/// - **200 OK** - The updated listing
/// - **403 Forbidden** - The caller does not own the listing
/// - **409 Conflict** - The listing changed while the update was applied
pub async fn update_listing(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    Path(id): Path<String>,
    user: AuthUser,
    payload: JsonBody<ListingPatch>,
) -> Result<Json<Listing>, AppError> {
    let Json(patch) = payload?;
    let store = ListingStore::new(&state.db);

    let mut listing = store.find_by_id(kind, &id)?;
    if !listing.is_owned_by(&user.id) {
        return Err(AppError::Unauthorized);
    }

    let dropped = listing.apply_patch(patch, state.clock.now())?;
    let saved = store.save(&listing)?;
    release_images(&state, dropped);

    Ok(Json(saved))
}

/// Deletes uploads a listing let go of, keeping any that another listing still
/// references. Runs after the listing write committed, so failures are only logged.
fn release_images(state: &AppState, dropped: Vec<String>) {
    if dropped.is_empty() {
        return;
    }
    let in_use = match ListingStore::new(&state.db).referenced_images() {
        Ok(in_use) => in_use,
        Err(err) => {
            tracing::warn!(error = %err, "cannot check image references, keeping uploads");
            return;
        }
    };
    let orphaned: Vec<String> = dropped
        .into_iter()
        .filter(|filename| !in_use.contains(filename))
        .collect();
    blob::remove_all(state.blobs.as_ref(), &orphaned);
}

/// Deletes a listing and its images. Only the owner may delete.
pub async fn delete_listing(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let store = ListingStore::new(&state.db);

    let listing = store.find_by_id(kind, &id)?;
    if !listing.is_owned_by(&user.id) {
        return Err(AppError::Unauthorized);
    }
    let deleted = store.delete(kind, &id)?;
    release_images(&state, deleted.images);

    tracing::info!(%kind, listing_id = %id, "listing deleted");
    Ok(Json(json!({
        "message": format!("{kind} deleted"),
        "deletedId": id
    })))
}

/// Contacts the owner of a listing directly
///
/// Records the interest on the listing and returns the owner's phone number
/// so the client can open a chat with them. Contacting the same listing
/// twice is rejected.
///
/// # Response
///
/// - **200 OK** - `{"message": "Contact initiated", "providerPhone": "...", "contact": {...}}`
/// - **400 Bad Request** - Already contacted
/// - **403 Forbidden** - The caller owns the listing
pub async fn contact_listing(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    Path(id): Path<String>,
    user: AuthUser,
    payload: Option<Json<ContactRequest>>,
) -> Result<Json<ContactInitiated>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let name = contact::contacting_name(&state, &user.id)?;

    let outcome = contact::initiate(
        &state,
        kind,
        &id,
        &user.id,
        &name,
        request.message,
        DuplicatePolicy::Reject,
    )?;

    Ok(Json(ContactInitiated {
        message: "Contact initiated",
        provider_phone: outcome.owner_phone,
        contact: outcome.contact,
    }))
}

pub async fn list_contacted(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<Json<Vec<ContactEntry>>, AppError> {
    Ok(Json(contact::list_contacted(&state, kind, &id, &user.id)?))
}

pub async fn confirm_contacted(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    Path((id, user_id)): Path<(String, String)>,
    user: AuthUser,
) -> Result<Json<ContactEntry>, AppError> {
    Ok(Json(contact::confirm(&state, kind, &id, &user_id, &user.id)?))
}

/// Removes a contact entry; returns the entries that remain
pub async fn remove_contacted(
    State(state): State<AppState>,
    Extension(kind): Extension<ListingKind>,
    Path((id, user_id)): Path<(String, String)>,
    user: AuthUser,
) -> Result<Json<Vec<ContactEntry>>, AppError> {
    Ok(Json(contact::remove(&state, kind, &id, &user_id, &user.id)?))
}

/// Lists the contact messages the caller sent, oldest first
///
/// `GET /api/contacts?page=1&limit=10` (limit is capped at 100)
pub async fn list_contacts(
    State(state): State<AppState>,
    user: AuthUser,
    params: QueryParams<ListParams>,
) -> Result<Json<Vec<Contact>>, AppError> {
    let Query(params) = params?;
    Ok(Json(contact::list_for_user(&state, &user.id, &params)?))
}

/// Sends a contact message about a listing
///
/// A repeat contact is handled according to `CONTACT_DUPLICATE_POLICY`:
/// ignored (the message is stored, the listing entry is kept as is) or
/// rejected with 400.
pub async fn create_contact(
    State(state): State<AppState>,
    user: AuthUser,
    payload: JsonBody<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), AppError> {
    let Json(request) = payload?;
    let name = contact::contacting_name(&state, &user.id)?;

    let outcome = contact::initiate(
        &state,
        request.kind,
        &request.listing_id,
        &user.id,
        &name,
        request.message,
        state.settings.contact_duplicates,
    )?;

    Ok((StatusCode::CREATED, Json(outcome.contact)))
}

pub async fn update_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    payload: JsonBody<ContactPatch>,
) -> Result<Json<Contact>, AppError> {
    let Json(patch) = payload?;
    Ok(Json(contact::update_contact(&state, &id, &user.id, patch)?))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    contact::delete_contact(&state, &id, &user.id)?;
    Ok(Json(json!({ "message": "Contact deleted" })))
}

/// Listings the caller can rate but has not rated yet
pub async fn pending_ratings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<PendingRating>>, AppError> {
    Ok(Json(rating::compute_pending(&state, &user.id)?))
}

/// Rates a listing
///
/// # Request Body
///
/// ```json
/// { "type": "flat", "targetId": "a1B2c3D4e5F6g7H8", "rating": 4, "comment": "good" }
/// ```
///
/// # Response
///
/// - **201 Created** - The stored rating
/// - **400 Bad Request** - Already rated, or rating outside 1 to 5
/// - **403 Forbidden** - No confirmed contact with the listing
/// - **404 Not Found** - The listing does not exist
pub async fn create_rating(
    State(state): State<AppState>,
    user: AuthUser,
    payload: JsonBody<CreateRatingRequest>,
) -> Result<(StatusCode, Json<Rating>), AppError> {
    let Json(request) = payload?;

    let rating = rating::create(
        &state,
        request.kind,
        &request.target_id,
        &user.id,
        request.rating,
        request.comment,
    )?;
    Ok((StatusCode::CREATED, Json(rating)))
}

/// Ratings of a listing, or of a user when the type segment is `user`
///
/// `GET /api/ratings/flat/{targetId}` or `GET /api/ratings/user/{userId}`
pub async fn list_ratings(
    State(state): State<AppState>,
    Path((kind, target_id)): Path<(String, String)>,
) -> Result<Json<Vec<Rating>>, AppError> {
    let ratings = if kind == "user" {
        rating::list_for_user(&state, &target_id)?
    } else {
        rating::list_for_target(&state, kind.parse()?, &target_id)?
    };
    Ok(Json(ratings))
}

/// Average score and number of ratings of a listing
///
/// `{"average": 4.5, "count": 2}`, or `{"average": "No ratings", "count": 0}`
pub async fn rating_summary(
    State(state): State<AppState>,
    Path((kind, target_id)): Path<(String, String)>,
) -> Result<Json<RatingSummary>, AppError> {
    let ratings = rating::list_for_target(&state, kind.parse()?, &target_id)?;
    Ok(Json(RatingSummary {
        average: rating::average_rating(&ratings),
        count: ratings.len(),
    }))
}

pub async fn update_rating(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    payload: JsonBody<RatingPatch>,
) -> Result<Json<Rating>, AppError> {
    let Json(patch) = payload?;
    Ok(Json(rating::update(&state, &id, &user.id, patch)?))
}

pub async fn delete_rating(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    rating::delete(&state, &id, &user.id)?;
    Ok(Json(json!({ "message": "Rating deleted" })))
}

/// Open requirements from every seeker, oldest first
///
/// `GET /api/requirements/all`
pub async fn list_open_requirements(
    State(state): State<AppState>,
) -> Result<Json<Vec<Requirement>>, AppError> {
    Ok(Json(requirement::list_open(&state)?))
}

/// The caller's requirements, fulfilled or not
pub async fn list_my_requirements(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Requirement>>, AppError> {
    Ok(Json(requirement::list_mine(&state, &user.id)?))
}

/// Posts a requirement
///
/// # Response
///
/// - **201 Created** - The stored requirement
/// - **400 Bad Request** - A field is missing, `forWhom` is unknown, or `shiftingDate` is not a date
pub async fn create_requirement(
    State(state): State<AppState>,
    user: AuthUser,
    payload: JsonBody<RequirementDraft>,
) -> Result<(StatusCode, Json<Requirement>), AppError> {
    let Json(draft) = payload?;
    let created = requirement::create(&state, &user.id, draft)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_requirement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    payload: JsonBody<RequirementPatch>,
) -> Result<Json<Requirement>, AppError> {
    let Json(patch) = payload?;
    Ok(Json(requirement::update(&state, &id, &user.id, patch)?))
}

pub async fn delete_requirement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    requirement::delete(&state, &id, &user.id)?;
    Ok(Json(json!({ "message": "Requirement deleted" })))
}
