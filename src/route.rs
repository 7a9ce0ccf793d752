//! Route definitions for the marketplace API
//!
//! This module configures all HTTP routes and maps them to their respective
//! handlers. Authentication is enforced per handler through the `AuthUser`
//! extractor, so public and protected methods can share a path.

use axum::routing::{get, post, put};
use axum::{Extension, Router};

use crate::database::AppState;
use crate::handler::{
    confirm_contacted, contact_listing, create_contact, create_listing, create_rating,
    create_requirement, delete_contact, delete_listing, delete_rating, delete_requirement,
    flat_nearby, get_listing, get_profile, list_contacted, list_contacts, list_listings,
    list_my_listings, list_my_requirements, list_open_requirements, list_ratings,
    nearby_listings, pending_ratings, rating_summary, remove_contacted, update_contact,
    update_listing, update_rating, update_requirement, upsert_profile,
};
use crate::model::ListingKind;

/// Routes shared by every listing kind
///
/// - `GET /` - Browse open listings (`?search&lat&lng`)
/// - `POST /` - Create a listing
/// - `GET /mine` - The caller's listings
/// - `GET /nearby` - Open listings around a point (`?lat&lng&radius`)
/// - `GET|PUT|DELETE /{id}` - Read, update, delete a listing
/// - `POST /{id}/contact` - Contact the owner
/// - `GET /{id}/contacted` - Contact entries (owner only)
/// - `PUT|POST /{id}/contacted/{user_id}/confirm` - Confirm an entry (owner only)
/// - `DELETE /{id}/contacted/{user_id}` - Remove an entry
fn listing_routes(kind: ListingKind) -> Router<AppState> {
    Router::new()
        .route("/", get(list_listings).post(create_listing))
        .route("/mine", get(list_my_listings))
        .route("/nearby", get(nearby_listings))
        .route(
            "/{id}",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
        .route("/{id}/contact", post(contact_listing))
        .route("/{id}/contacted", get(list_contacted))
        .route(
            "/{id}/contacted/{user_id}/confirm",
            put(confirm_contacted).post(confirm_contacted),
        )
        .route(
            "/{id}/contacted/{user_id}",
            axum::routing::delete(remove_contacted),
        )
        .layer(Extension(kind))
}

/// Creates and configures the application router with all routes
///
/// # Example Usage
///
/// ```no_run
/// # use nestmate::config::Config;
/// # use nestmate::database::{init_db, AppState};
/// # use nestmate::route::create_app;
/// # let config = Config { jwt_secret: "secret".into(), ..Config::default() };
/// # let db = init_db("data.db").unwrap();
/// let app = create_app(AppState::new(db, &config));
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    let flats = listing_routes(ListingKind::Flat).route("/{id}/nearby", get(flat_nearby));

    let contacts = Router::new()
        .route("/", get(list_contacts).post(create_contact))
        .route("/{id}", put(update_contact).delete(delete_contact));

    // `{id}` doubles as the type segment in `/{type}/{target_id}`
    let ratings = Router::new()
        .route("/", post(create_rating))
        .route("/pending", get(pending_ratings))
        .route("/{id}", put(update_rating).delete(delete_rating))
        .route("/{id}/{target_id}", get(list_ratings))
        .route("/{id}/{target_id}/summary", get(rating_summary));

    // `GET /` is the caller's own list, `GET /all` the public open list
    let requirements = Router::new()
        .route("/", get(list_my_requirements).post(create_requirement))
        .route("/all", get(list_open_requirements))
        .route("/{id}", put(update_requirement).delete(delete_requirement));

    Router::new()
        .route("/api/users/me", get(get_profile).put(upsert_profile))
        .nest("/api/flats", flats)
        .nest("/api/services", listing_routes(ListingKind::Service))
        .nest("/api/messes", listing_routes(ListingKind::Mess))
        .nest("/api/contacts", contacts)
        .nest("/api/ratings", ratings)
        .nest("/api/requirements", requirements)
        .with_state(state)
}
