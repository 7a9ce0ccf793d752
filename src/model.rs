//! Data models for the listings marketplace
//!
//! This module defines the documents persisted in the database (listings,
//! contacts, ratings, user profiles) and the request/response payloads of the
//! HTTP API. Field names are camelCase on the wire and in storage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use redb::TableDefinition;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::database::{TABLE_FLATS, TABLE_MESSES, TABLE_SERVICES};
use crate::error::AppError;
pub use crate::geo::Coordinate;

/// Generates a random 16-character alphanumeric document id.
pub fn new_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// The three kinds of listing a provider can publish.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Flat,
    Service,
    Mess,
}

impl ListingKind {
    /// Kinds in the order pending ratings are reported.
    pub const ALL: [ListingKind; 3] = [ListingKind::Flat, ListingKind::Service, ListingKind::Mess];

    pub fn as_str(self) -> &'static str {
        match self {
            ListingKind::Flat => "flat",
            ListingKind::Service => "service",
            ListingKind::Mess => "mess",
        }
    }

    pub(crate) fn table(self) -> TableDefinition<'static, &'static str, &'static str> {
        match self {
            ListingKind::Flat => TABLE_FLATS,
            ListingKind::Service => TABLE_SERVICES,
            ListingKind::Mess => TABLE_MESSES,
        }
    }

    /// Attribute holding the human-readable name of a listing of this kind.
    pub fn title_field(self) -> &'static str {
        match self {
            ListingKind::Flat => "apartmentName",
            ListingKind::Service => "name",
            ListingKind::Mess => "messName",
        }
    }

    /// The status under which a listing shows up in browsing and search.
    pub fn open_status(self) -> ListingStatus {
        match self {
            ListingKind::Flat => ListingStatus::Available,
            ListingKind::Service | ListingKind::Mess => ListingStatus::Active,
        }
    }

    pub fn accepts(self, status: ListingStatus) -> bool {
        match self {
            ListingKind::Flat => matches!(status, ListingStatus::Available | ListingStatus::Rented),
            ListingKind::Service | ListingKind::Mess => {
                matches!(status, ListingStatus::Active | ListingStatus::Inactive)
            }
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(ListingKind::Flat),
            "service" => Ok(ListingKind::Service),
            "mess" => Ok(ListingKind::Mess),
            other => Err(AppError::Validation(format!("Invalid target type: {other}"))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Available,
    Rented,
    Active,
    Inactive,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
}

impl Location {
    /// Coordinates are mandatory on every listing written through the API.
    fn require_coordinates(&self) -> Result<Coordinate, AppError> {
        let coordinates = self.coordinates.ok_or_else(|| {
            AppError::Validation("location.coordinates is required".to_string())
        })?;
        coordinates.validate()?;
        Ok(coordinates)
    }
}

/// One user's expressed interest in a listing, embedded in the listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactEntry {
    pub user_id: String,
    /// Name of the contacting user at the time of contact, never refreshed.
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub confirmed: bool,
}

/// Keys owned by `Listing` itself that can never appear among the free-form attributes.
const RESERVED_KEYS: &[&str] = &[
    "id",
    "kind",
    "ownerId",
    "status",
    "location",
    "images",
    "contactedUsers",
    "createdAt",
    "updatedAt",
    "version",
    "distance",
];

fn strip_reserved(mut attributes: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_KEYS {
        attributes.remove(*key);
    }
    attributes
}

/// A flat, service or mess offered by its owner.
///
/// Type-specific attributes (rent, amenities, timings, ...) are not
/// interpreted by the core and are kept as a flattened JSON map.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub kind: ListingKind,
    pub owner_id: String,
    pub status: ListingStatus,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    contacted_users: Vec<ContactEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Listing {
    /// Builds a new listing owned by `owner_id` from a validated draft.
    pub fn create(
        kind: ListingKind,
        owner_id: &str,
        draft: ListingDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let status = draft.status.unwrap_or_else(|| kind.open_status());
        check_status(kind, status)?;
        draft.location.require_coordinates()?;

        let listing = Self {
            id: new_id(),
            kind,
            owner_id: owner_id.to_string(),
            status,
            location: draft.location,
            images: draft.images,
            contacted_users: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
            attributes: strip_reserved(draft.attributes),
        };

        if listing.title().is_none() {
            return Err(AppError::Validation(format!(
                "{} is required",
                kind.title_field()
            )));
        }

        Ok(listing)
    }

    pub fn title(&self) -> Option<&str> {
        self.attributes
            .get(self.kind.title_field())
            .and_then(Value::as_str)
            .filter(|title| !title.trim().is_empty())
    }

    pub fn display_name(&self) -> String {
        self.title().unwrap_or("Untitled").to_string()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn is_open(&self) -> bool {
        self.status == self.kind.open_status()
    }

    pub fn coordinates(&self) -> Option<Coordinate> {
        self.location.coordinates
    }

    /// Applies a partial update and returns the images it dropped.
    pub fn apply_patch(
        &mut self,
        patch: ListingPatch,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, AppError> {
        if let Some(status) = patch.status {
            check_status(self.kind, status)?;
            self.status = status;
        }

        if let Some(location) = patch.location {
            location.require_coordinates()?;
            self.location = location;
        }

        let mut dropped = Vec::new();
        if let Some(images) = patch.images {
            dropped = self
                .images
                .iter()
                .filter(|old| !images.contains(old))
                .cloned()
                .collect();
            self.images = images;
        }

        let title_field = self.kind.title_field();
        for (key, value) in strip_reserved(patch.attributes) {
            if key == title_field && value.as_str().map_or(true, |t| t.trim().is_empty()) {
                return Err(AppError::Validation(format!("{title_field} cannot be empty")));
            }
            self.attributes.insert(key, value);
        }

        self.updated_at = now;
        Ok(dropped)
    }

    pub fn contacted_users(&self) -> &[ContactEntry] {
        &self.contacted_users
    }

    pub fn contact_entry(&self, user_id: &str) -> Option<&ContactEntry> {
        self.contacted_users.iter().find(|c| c.user_id == user_id)
    }

    pub fn has_confirmed_contact(&self, user_id: &str) -> bool {
        self.contact_entry(user_id).is_some_and(|c| c.confirmed)
    }

    /// Appends `entry` unless the user already has one. Returns whether it was added.
    pub fn add_contact(&mut self, entry: ContactEntry) -> bool {
        if self.contact_entry(&entry.user_id).is_some() {
            return false;
        }
        self.contacted_users.push(entry);
        true
    }

    /// Marks the user's entry as confirmed. Confirming twice is harmless.
    pub fn confirm_contact(&mut self, user_id: &str) -> Option<&ContactEntry> {
        let entry = self
            .contacted_users
            .iter_mut()
            .find(|c| c.user_id == user_id)?;
        entry.confirmed = true;
        Some(entry)
    }

    /// Drops the user's entry. Returns whether anything was removed.
    pub fn remove_contact(&mut self, user_id: &str) -> bool {
        let before = self.contacted_users.len();
        self.contacted_users.retain(|c| c.user_id != user_id);
        self.contacted_users.len() != before
    }
}

fn check_status(kind: ListingKind, status: ListingStatus) -> Result<(), AppError> {
    if kind.accepts(status) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "status {status:?} is not valid for a {kind}"
        )))
    }
}

/// Request payload for creating a listing.
///
/// # Example
/// ```json
/// {
///   "apartmentName": "Sunrise Residency",
///   "location": { "city": "Pune", "coordinates": { "lat": 18.52, "lng": 73.85 } },
///   "rentPrice": 15000
/// }
/// ```
#[derive(Deserialize, Debug)]
pub struct ListingDraft {
    pub status: Option<ListingStatus>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Partial update of a listing. Absent fields are left untouched.
#[derive(Deserialize, Debug, Default)]
pub struct ListingPatch {
    pub status: Option<ListingStatus>,
    pub location: Option<Location>,
    pub images: Option<Vec<String>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// A listing annotated with its distance from a point of interest.
#[derive(Serialize, Debug, Clone)]
pub struct ListingWithDistance {
    #[serde(flatten)]
    pub listing: Listing,
    pub distance: Option<f64>,
}

/// Query parameters for browsing listings
///
/// Query string: `?search=Kothrud&lat=18.52&lng=73.85`
#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    pub search: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Query parameters for a proximity query
///
/// Query string: `?lat=18.52&lng=73.85&radius=2.5`
#[derive(Deserialize, Debug, Default)]
pub struct NearbyParams {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Radius in kilometers, defaults to the configured nearby radius
    pub radius: Option<f64>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NearbyListings {
    pub nearby_messes: Vec<ListingWithDistance>,
    pub nearby_services: Vec<ListingWithDistance>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Pending,
    Responded,
}

/// Inbox record created whenever a user reaches out to a listing owner.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    /// Sender
    pub user_id: String,
    /// Recipient, the owner of the listing that was contacted
    pub contacted_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for the direct per-listing contact endpoint.
#[derive(Deserialize, Debug, Default)]
pub struct ContactRequest {
    pub message: Option<String>,
}

/// Request payload for the generic contact endpoint
///
/// # Example
/// ```json
/// { "type": "flat", "listingId": "a1B2c3D4e5F6g7H8", "message": "Is it still available?" }
/// ```
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactRequest {
    #[serde(rename = "type")]
    pub kind: ListingKind,
    pub listing_id: String,
    pub message: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ContactPatch {
    pub message: Option<String>,
    pub status: Option<ContactStatus>,
}

/// Response of the direct contact endpoint.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContactInitiated {
    pub message: &'static str,
    pub provider_phone: Option<String>,
    pub contact: Contact,
}

/// Query parameters for listing the caller's contacts with pagination
///
/// Query string: `?page=2&limit=20`
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    /// Page number, starts from 1 (default: 1)
    pub page: Option<usize>,
    /// Items per page, default 10, maximum 100
    pub limit: Option<usize>,
}

/// A 1 to 5 score left on a listing by a confirmed contact.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ListingKind,
    pub target_id: String,
    pub user_id: String,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for rating a listing
///
/// # Example
/// ```json
/// { "type": "flat", "targetId": "a1B2c3D4e5F6g7H8", "rating": 4, "comment": "good" }
/// ```
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateRatingRequest {
    #[serde(rename = "type")]
    pub kind: ListingKind,
    pub target_id: String,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RatingPatch {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

/// A listing the user may rate but has not yet.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRating {
    #[serde(rename = "type")]
    pub kind: ListingKind,
    pub target_id: String,
    pub display_name: String,
}

/// Mean of a set of ratings, or the sentinel shown when there are none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AverageRating {
    Value(f64),
    NoRatings,
}

impl Serialize for AverageRating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AverageRating::Value(value) => serializer.serialize_f64(*value),
            AverageRating::NoRatings => serializer.serialize_str("No ratings"),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct RatingSummary {
    pub average: AverageRating,
    pub count: usize,
}

/// Profile of a registered user as far as the marketplace needs it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ProfileRequest {
    pub name: String,
    pub phone: Option<String>,
}

/// Who a housing requirement is posted for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForWhom {
    #[serde(rename = "bachelor male")]
    BachelorMale,
    #[serde(rename = "bachelor female")]
    BachelorFemale,
    #[serde(rename = "working male")]
    WorkingMale,
    #[serde(rename = "working female")]
    WorkingFemale,
}

/// A seeker's request for a place, shown to providers until it is fulfilled.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub id: String,
    pub user_id: String,
    pub for_whom: ForWhom,
    /// Free-text area the seeker wants to live in
    pub location: String,
    pub max_rent: f64,
    pub shifting_date: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub fulfilled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for posting a requirement. Every field is required.
///
/// # Example
/// ```json
/// {
///   "forWhom": "working female",
///   "location": "Baner",
///   "maxRent": 12000,
///   "shiftingDate": "2025-06-01",
///   "description": "1BHK near the IT park"
/// }
/// ```
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequirementDraft {
    pub for_whom: Option<ForWhom>,
    pub location: Option<String>,
    pub max_rent: Option<f64>,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp
    pub shifting_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequirementPatch {
    pub for_whom: Option<ForWhom>,
    pub location: Option<String>,
    pub max_rent: Option<f64>,
    pub shifting_date: Option<String>,
    pub description: Option<String>,
    pub fulfilled: Option<bool>,
}
