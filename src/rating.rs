//! Rating workflow
//!
//! A user may rate a listing once, and only after its owner confirmed the
//! user's contact entry. Ratings are therefore always `verified`.

use tracing::info;

use crate::database::AppState;
use crate::error::AppError;
use crate::model::{
    new_id, AverageRating, ListingKind, PendingRating, Rating, RatingPatch,
};
use crate::store::{load_listing_in, ListingStore, RatingStore};

fn check_value(value: i64) -> Result<u8, AppError> {
    match u8::try_from(value) {
        Ok(v @ 1..=5) => Ok(v),
        _ => Err(AppError::InvalidRatingValue(value)),
    }
}

/// Listings where the user holds a confirmed contact but has not rated yet.
///
/// Flats come first, then services, then messes; inside a group the order is
/// whatever the store yields.
pub fn compute_pending(state: &AppState, user_id: &str) -> Result<Vec<PendingRating>, AppError> {
    let listings = ListingStore::new(&state.db);
    let rated = RatingStore::new(&state.db).rated_target_ids(user_id)?;

    let mut pending = Vec::new();
    for kind in ListingKind::ALL {
        for listing in listings.scan(kind)? {
            if listing.has_confirmed_contact(user_id) && !rated.contains(&listing.id) {
                pending.push(PendingRating {
                    kind,
                    display_name: listing.display_name(),
                    target_id: listing.id,
                });
            }
        }
    }
    Ok(pending)
}

/// Records a rating of `target_id` by `user_id`.
///
/// Checks, in order: the listing exists (`TargetNotFound`), the user has a
/// confirmed contact on it (`NotEligible`), the user has not rated it yet
/// (`DuplicateRating`), and the value is an integer from 1 to 5
/// (`InvalidRatingValue`). The checks and the insert share one write
/// transaction.
pub fn create(
    state: &AppState,
    kind: ListingKind,
    target_id: &str,
    user_id: &str,
    value: i64,
    comment: Option<String>,
) -> Result<Rating, AppError> {
    let write_txn = state.db.begin_write()?;

    let target = load_listing_in(&write_txn, kind, target_id)?
        .ok_or_else(|| AppError::TargetNotFound(kind.to_string()))?;
    if !target.has_confirmed_contact(user_id) {
        return Err(AppError::NotEligible);
    }
    if RatingStore::exists_in(&write_txn, user_id, target_id)? {
        return Err(AppError::DuplicateRating);
    }
    let value = check_value(value)?;

    let now = state.clock.now();
    let rating = Rating {
        id: new_id(),
        kind,
        target_id: target_id.to_string(),
        user_id: user_id.to_string(),
        rating: value,
        comment,
        verified: true,
        created_at: now,
        updated_at: now,
    };
    RatingStore::insert_in(&write_txn, &rating)?;
    write_txn.commit()?;

    info!(%kind, target_id, user_id, rating = value, "rating created");
    Ok(rating)
}

/// Applies a partial change to the score and/or comment. Only the author may.
pub fn update(
    state: &AppState,
    rating_id: &str,
    acting_user_id: &str,
    patch: RatingPatch,
) -> Result<Rating, AppError> {
    let store = RatingStore::new(&state.db);
    let mut rating = store.find_by_id(rating_id)?;
    if rating.user_id != acting_user_id {
        return Err(AppError::Unauthorized);
    }

    if let Some(value) = patch.rating {
        rating.rating = check_value(value)?;
    }
    if let Some(comment) = patch.comment {
        rating.comment = Some(comment);
    }
    rating.updated_at = state.clock.now();

    store.update(&rating)?;
    Ok(rating)
}

pub fn delete(state: &AppState, rating_id: &str, acting_user_id: &str) -> Result<(), AppError> {
    let store = RatingStore::new(&state.db);
    let rating = store.find_by_id(rating_id)?;
    if rating.user_id != acting_user_id {
        return Err(AppError::Unauthorized);
    }
    store.delete(&rating)?;
    info!(rating_id, "rating deleted");
    Ok(())
}

pub fn list_for_target(
    state: &AppState,
    kind: ListingKind,
    target_id: &str,
) -> Result<Vec<Rating>, AppError> {
    RatingStore::new(&state.db).list_for_target(kind, target_id)
}

pub fn list_for_user(state: &AppState, user_id: &str) -> Result<Vec<Rating>, AppError> {
    RatingStore::new(&state.db).list_for_user(user_id)
}

/// Arithmetic mean rounded to one decimal place.
pub fn average_rating(ratings: &[Rating]) -> AverageRating {
    if ratings.is_empty() {
        return AverageRating::NoRatings;
    }
    let sum: f64 = ratings.iter().map(|r| f64::from(r.rating)).sum();
    let mean = sum / ratings.len() as f64;
    AverageRating::Value((mean * 10.0).round() / 10.0)
}
