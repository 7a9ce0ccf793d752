//! Housing requirements
//!
//! Seekers post what they are looking for (who it is for, where, the most
//! they will pay, when they move). Open requirements are public so providers
//! can reach out; only the poster may edit or delete one.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::info;

use crate::database::AppState;
use crate::error::AppError;
use crate::model::{new_id, Requirement, RequirementDraft, RequirementPatch};
use crate::store::RequirementStore;

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_shifting_date(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| AppError::Validation(format!("shiftingDate is not a date: {raw}")))
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_rent(max_rent: f64) -> Result<f64, AppError> {
    if max_rent.is_finite() && max_rent > 0.0 {
        Ok(max_rent)
    } else {
        Err(AppError::Validation("maxRent must be a positive number".to_string()))
    }
}

/// Builds a new open requirement. Every draft field must be present and non-blank.
pub fn build(user_id: &str, draft: RequirementDraft, now: DateTime<Utc>) -> Result<Requirement, AppError> {
    let all_required = || AppError::Validation("All fields are required".to_string());

    let for_whom = draft.for_whom.ok_or_else(all_required)?;
    let location = text(draft.location).ok_or_else(all_required)?;
    let max_rent = draft.max_rent.ok_or_else(all_required)?;
    let shifting_date = text(draft.shifting_date).ok_or_else(all_required)?;
    let description = text(draft.description).ok_or_else(all_required)?;

    Ok(Requirement {
        id: new_id(),
        user_id: user_id.to_string(),
        for_whom,
        location,
        max_rent: check_rent(max_rent)?,
        shifting_date: parse_shifting_date(&shifting_date)?,
        description,
        fulfilled: false,
        created_at: now,
        updated_at: now,
    })
}

fn apply_patch(requirement: &mut Requirement, patch: RequirementPatch) -> Result<(), AppError> {
    if let Some(for_whom) = patch.for_whom {
        requirement.for_whom = for_whom;
    }
    if let Some(location) = patch.location {
        requirement.location = text(Some(location))
            .ok_or_else(|| AppError::Validation("location cannot be empty".to_string()))?;
    }
    if let Some(max_rent) = patch.max_rent {
        requirement.max_rent = check_rent(max_rent)?;
    }
    if let Some(raw) = patch.shifting_date {
        requirement.shifting_date = parse_shifting_date(&raw)?;
    }
    if let Some(description) = patch.description {
        requirement.description = text(Some(description))
            .ok_or_else(|| AppError::Validation("description cannot be empty".to_string()))?;
    }
    if let Some(fulfilled) = patch.fulfilled {
        requirement.fulfilled = fulfilled;
    }
    Ok(())
}

pub fn create(state: &AppState, user_id: &str, draft: RequirementDraft) -> Result<Requirement, AppError> {
    let requirement = build(user_id, draft, state.clock.now())?;
    RequirementStore::new(&state.db).insert(&requirement)?;

    info!(requirement_id = %requirement.id, user_id, "requirement posted");
    Ok(requirement)
}

/// Partial update. Only the poster may change a requirement.
pub fn update(
    state: &AppState,
    requirement_id: &str,
    acting_user_id: &str,
    patch: RequirementPatch,
) -> Result<Requirement, AppError> {
    let store = RequirementStore::new(&state.db);
    let mut requirement = store.find_by_id(requirement_id)?;
    if requirement.user_id != acting_user_id {
        return Err(AppError::Unauthorized);
    }

    apply_patch(&mut requirement, patch)?;
    requirement.updated_at = state.clock.now();

    store.update(&requirement)?;
    Ok(requirement)
}

pub fn delete(state: &AppState, requirement_id: &str, acting_user_id: &str) -> Result<(), AppError> {
    let store = RequirementStore::new(&state.db);
    let requirement = store.find_by_id(requirement_id)?;
    if requirement.user_id != acting_user_id {
        return Err(AppError::Unauthorized);
    }
    store.delete(&requirement)?;
    info!(requirement_id, "requirement deleted");
    Ok(())
}

pub fn list_mine(state: &AppState, user_id: &str) -> Result<Vec<Requirement>, AppError> {
    RequirementStore::new(&state.db).list_for_user(user_id)
}

pub fn list_open(state: &AppState) -> Result<Vec<Requirement>, AppError> {
    RequirementStore::new(&state.db).list_open()
}
