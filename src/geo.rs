//! Great-circle distance between two points on the Earth's surface

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A `{lat, lng}` pair in degrees.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds a coordinate from optional query parameters.
    ///
    /// Both parts must be present and finite, otherwise the point of interest
    /// is rejected with `InvalidCoordinate`.
    pub fn from_query(lat: Option<f64>, lng: Option<f64>) -> Result<Self, AppError> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => {
                let coordinate = Self { lat, lng };
                coordinate.validate()?;
                Ok(coordinate)
            }
            _ => Err(AppError::InvalidCoordinate),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.lat.is_finite() && self.lng.is_finite() {
            Ok(())
        } else {
            Err(AppError::InvalidCoordinate)
        }
    }
}

/// Haversine distance in kilometers.
///
/// Latitude and longitude ranges are not checked, only that every component
/// is a finite number, so the result is never `NaN`.
pub fn distance_km(a: &Coordinate, b: &Coordinate) -> Result<f64, AppError> {
    a.validate()?;
    b.validate()?;

    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    // Rounding can push `h` just past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    Ok(EARTH_RADIUS_KM * c)
}
