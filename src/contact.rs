//! Contact workflow
//!
//! A user registers interest in a listing (`initiate`), the listing owner
//! acknowledges it (`confirm`), and either side can withdraw it (`remove`).
//! Per listing and user the entry goes `none -> pending -> confirmed`, and
//! `remove` ends it from either state. A confirmed entry is what later allows
//! the user to rate the listing.
//!
//! Every transition is a read-modify-write of the listing inside one write
//! transaction, so concurrent transitions on the same listing serialize
//! instead of overwriting each other.

use tracing::info;

use crate::config::DuplicatePolicy;
use crate::database::AppState;
use crate::error::AppError;
use crate::model::{
    new_id, Contact, ContactEntry, ContactPatch, ContactStatus, ListParams, ListingKind,
};
use crate::store::{ContactStore, ListingStore, UserStore};

/// Result of a successful `initiate`.
#[derive(Debug, Clone)]
pub struct ContactOutcome {
    /// The inbox record created for the owner.
    pub contact: Contact,
    /// False when the user already had an entry and the policy ignored the repeat.
    pub entry_added: bool,
    /// The owner's phone number, for the caller to build a chat deep link.
    pub owner_phone: Option<String>,
}

/// Name recorded in a new contact entry: the user's profile name, or `"Unknown"`.
pub fn contacting_name(state: &AppState, user_id: &str) -> Result<String, AppError> {
    Ok(UserStore::new(&state.db)
        .find(user_id)?
        .map(|profile| profile.name)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string()))
}

/// Registers `user_id`'s interest in a listing.
///
/// Fails with `SelfContact` when the user owns the listing. When the user
/// already has an entry, `DuplicatePolicy::Reject` fails with
/// `AlreadyContacted` while `DuplicatePolicy::Ignore` still records the
/// message but leaves the existing entry untouched.
pub fn initiate(
    state: &AppState,
    kind: ListingKind,
    listing_id: &str,
    user_id: &str,
    user_name: &str,
    message: Option<String>,
    policy: DuplicatePolicy,
) -> Result<ContactOutcome, AppError> {
    let now = state.clock.now();

    let (contact, entry_added) =
        ListingStore::new(&state.db).modify(kind, listing_id, |listing, txn| {
            if listing.is_owned_by(user_id) {
                return Err(AppError::SelfContact);
            }
            if listing.contact_entry(user_id).is_some() && policy == DuplicatePolicy::Reject {
                return Err(AppError::AlreadyContacted);
            }

            let contact = Contact {
                id: new_id(),
                user_id: user_id.to_string(),
                contacted_id: listing.owner_id.clone(),
                message,
                status: ContactStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            ContactStore::insert_in(txn, &contact)?;

            let entry_added = listing.add_contact(ContactEntry {
                user_id: user_id.to_string(),
                name: user_name.to_string(),
                date: now,
                confirmed: false,
            });
            Ok((contact, entry_added))
        })?;

    let owner_phone = UserStore::new(&state.db)
        .find(&contact.contacted_id)?
        .and_then(|owner| owner.phone);

    info!(
        %kind,
        listing_id,
        user_id,
        entry_added,
        "contact initiated"
    );

    Ok(ContactOutcome {
        contact,
        entry_added,
        owner_phone,
    })
}

/// Marks `target_user_id`'s entry as confirmed. Only the owner may confirm.
pub fn confirm(
    state: &AppState,
    kind: ListingKind,
    listing_id: &str,
    target_user_id: &str,
    acting_user_id: &str,
) -> Result<ContactEntry, AppError> {
    let entry = ListingStore::new(&state.db).modify(kind, listing_id, |listing, _| {
        if !listing.is_owned_by(acting_user_id) {
            return Err(AppError::Unauthorized);
        }
        listing
            .confirm_contact(target_user_id)
            .cloned()
            .ok_or(AppError::ContactNotFound)
    })?;

    info!(%kind, listing_id, target_user_id, "contact confirmed");
    Ok(entry)
}

/// Deletes `target_user_id`'s entry and returns the remaining ones.
///
/// Allowed for the listing owner and for the contacted user themselves.
pub fn remove(
    state: &AppState,
    kind: ListingKind,
    listing_id: &str,
    target_user_id: &str,
    acting_user_id: &str,
) -> Result<Vec<ContactEntry>, AppError> {
    let remaining = ListingStore::new(&state.db).modify(kind, listing_id, |listing, _| {
        if !listing.is_owned_by(acting_user_id) && acting_user_id != target_user_id {
            return Err(AppError::Unauthorized);
        }
        if !listing.remove_contact(target_user_id) {
            return Err(AppError::ContactNotFound);
        }
        Ok(listing.contacted_users().to_vec())
    })?;

    info!(%kind, listing_id, target_user_id, acting_user_id, "contact removed");
    Ok(remaining)
}

/// Entries of a listing in insertion order. Only the owner may list them.
pub fn list_contacted(
    state: &AppState,
    kind: ListingKind,
    listing_id: &str,
    acting_user_id: &str,
) -> Result<Vec<ContactEntry>, AppError> {
    let listing = ListingStore::new(&state.db).find_by_id(kind, listing_id)?;
    if !listing.is_owned_by(acting_user_id) {
        return Err(AppError::Unauthorized);
    }
    Ok(listing.contacted_users().to_vec())
}

/// Inbox records sent by `user_id`, oldest first, paginated.
pub fn list_for_user(
    state: &AppState,
    user_id: &str,
    params: &ListParams,
) -> Result<Vec<Contact>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1).saturating_mul(limit);

    ContactStore::new(&state.db).list_for_user(user_id, offset, limit)
}

/// Edits a contact record. Only its sender may do so.
pub fn update_contact(
    state: &AppState,
    contact_id: &str,
    acting_user_id: &str,
    patch: ContactPatch,
) -> Result<Contact, AppError> {
    let store = ContactStore::new(&state.db);
    let mut contact = store.find_by_id(contact_id)?;
    if contact.user_id != acting_user_id {
        return Err(AppError::Unauthorized);
    }

    if let Some(message) = patch.message {
        contact.message = Some(message);
    }
    if let Some(status) = patch.status {
        contact.status = status;
    }
    contact.updated_at = state.clock.now();

    store.update(&contact)?;
    Ok(contact)
}

/// Deletes a contact record. Only its sender may do so.
pub fn delete_contact(state: &AppState, contact_id: &str, acting_user_id: &str) -> Result<(), AppError> {
    let store = ContactStore::new(&state.db);
    let contact = store.find_by_id(contact_id)?;
    if contact.user_id != acting_user_id {
        return Err(AppError::Unauthorized);
    }
    store.delete(&contact)?;
    info!(contact_id, "contact record deleted");
    Ok(())
}
