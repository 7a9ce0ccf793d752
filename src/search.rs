//! Listing discovery: proximity queries and text search

use std::cmp::Ordering;

use tracing::debug;

use crate::database::AppState;
use crate::error::AppError;
use crate::geo::{distance_km, Coordinate};
use crate::model::{Listing, ListingKind, ListingWithDistance, NearbyListings};
use crate::store::ListingStore;

fn check_radius(radius_km: f64) -> Result<(), AppError> {
    if radius_km.is_finite() && radius_km > 0.0 {
        Ok(())
    } else {
        Err(AppError::Validation(
            "radius must be a positive number of kilometers".to_string(),
        ))
    }
}

/// Nearest first; listings without a distance go last. `sort_by` is stable,
/// so ties keep store order.
fn by_distance(a: &ListingWithDistance, b: &ListingWithDistance) -> Ordering {
    match (a.distance, b.distance) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Open listings of `kind` within `radius_km` of `poi`, nearest first.
pub fn nearby(
    state: &AppState,
    kind: ListingKind,
    poi: &Coordinate,
    radius_km: f64,
) -> Result<Vec<ListingWithDistance>, AppError> {
    poi.validate()?;
    check_radius(radius_km)?;

    let candidates = ListingStore::new(&state.db)
        .find_by_status_and_coordinates_present(kind, kind.open_status())?;

    let mut results = Vec::new();
    for listing in candidates {
        let Some(coordinates) = listing.coordinates() else {
            continue;
        };
        let distance = distance_km(poi, &coordinates)?;
        if distance <= radius_km {
            results.push(ListingWithDistance {
                listing,
                distance: Some(distance),
            });
        }
    }
    results.sort_by(by_distance);

    debug!(%kind, radius_km, found = results.len(), "nearby query");
    Ok(results)
}

/// Open messes and services around a flat.
pub fn nearby_for_flat(
    state: &AppState,
    flat_id: &str,
    radius_km: f64,
) -> Result<NearbyListings, AppError> {
    let flat = ListingStore::new(&state.db).find_by_id(ListingKind::Flat, flat_id)?;
    let Some(center) = flat.coordinates() else {
        return Err(AppError::NotFound(
            "Flat not found or missing coordinates".to_string(),
        ));
    };

    Ok(NearbyListings {
        nearby_messes: nearby(state, ListingKind::Mess, &center, radius_km)?,
        nearby_services: nearby(state, ListingKind::Service, &center, radius_km)?,
    })
}

fn matches_term(listing: &Listing, term: &str) -> bool {
    let term = term.to_lowercase();
    let location = &listing.location;
    [&location.city, &location.locality, &location.landmark]
        .into_iter()
        .flatten()
        .any(|field| field.trim().to_lowercase() == term)
}

/// Open listings whose city, locality or landmark equals `term`,
/// ignoring case. A blank term matches everything.
///
/// With a point of interest every result carries its distance and the list
/// is sorted nearest first; listings without coordinates come last with no
/// distance. Without one, results keep store order and carry no distance.
pub fn search_by_text(
    state: &AppState,
    kind: ListingKind,
    term: Option<&str>,
    poi: Option<&Coordinate>,
) -> Result<Vec<ListingWithDistance>, AppError> {
    let term = term.map(str::trim).filter(|t| !t.is_empty());

    let mut results = Vec::new();
    for listing in ListingStore::new(&state.db).scan(kind)? {
        if !listing.is_open() {
            continue;
        }
        if let Some(term) = term {
            if !matches_term(&listing, term) {
                continue;
            }
        }

        let distance = match (poi, listing.coordinates()) {
            (Some(poi), Some(coordinates)) => Some(distance_km(poi, &coordinates)?),
            _ => None,
        };
        results.push(ListingWithDistance { listing, distance });
    }

    if poi.is_some() {
        results.sort_by(by_distance);
    }

    debug!(%kind, term = term.unwrap_or(""), found = results.len(), "text search");
    Ok(results)
}
