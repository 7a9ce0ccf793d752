//! Document stores over the embedded database
//!
//! Each store reads and writes JSON documents in its own table and keeps the
//! matching index tables in step. Operations that must be atomic with other
//! writes are also exposed as `*_in` functions taking an open write
//! transaction, so a workflow can combine them and commit once.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

use crate::database::{
    TABLE_CONTACTS, TABLE_CONTACTS_BY_USER, TABLE_LISTINGS_BY_OWNER, TABLE_RATINGS,
    TABLE_RATINGS_BY_TARGET, TABLE_RATINGS_BY_USER, TABLE_REQUIREMENTS,
    TABLE_REQUIREMENTS_BY_USER, TABLE_USERS,
};
use crate::error::AppError;
use crate::model::{
    Contact, Listing, ListingKind, ListingStatus, Rating, Requirement, UserProfile,
};

fn get_doc<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static str>,
    key: &str,
) -> Result<Option<T>, AppError> {
    match table.get(key)? {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

fn to_json<T: Serialize>(doc: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(doc)?)
}

/// Range bounds covering every composite key that starts with `prefix:`.
///
/// `{` sorts right after the alphanumerics used in ids, so `"prefix:{"` is an
/// exclusive upper bound for all of them.
fn prefix_range(prefix: &str) -> (String, String) {
    (format!("{prefix}:"), format!("{prefix}:{{"))
}

/// Sortable time component of an index key.
fn time_key(at: DateTime<Utc>) -> String {
    format!("{:020}", at.timestamp_micros())
}

/// Follows the ids stored in `index` under `prefix` to the documents in `docs`.
fn collect_indexed<T: DeserializeOwned>(
    index: &impl ReadableTable<&'static str, &'static str>,
    docs: &impl ReadableTable<&'static str, &'static str>,
    prefix: &str,
    skip: usize,
    take: usize,
) -> Result<Vec<T>, AppError> {
    let (start, end) = prefix_range(prefix);
    let mut out = Vec::new();
    for entry in index.range(start.as_str()..end.as_str())?.skip(skip).take(take) {
        let (_, id) = entry?;
        // An index entry without its document is skipped rather than failing the read
        if let Some(doc) = get_doc(docs, id.value())? {
            out.push(doc);
        }
    }
    Ok(out)
}

fn owner_key(listing: &Listing) -> String {
    format!("{}:{}:{}", listing.kind, listing.owner_id, listing.id)
}

fn listing_not_found(kind: ListingKind) -> AppError {
    AppError::NotFound(capitalized(kind))
}

fn capitalized(kind: ListingKind) -> String {
    let name = kind.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Loads a listing inside an open write transaction.
pub(crate) fn load_listing_in(
    txn: &WriteTransaction,
    kind: ListingKind,
    id: &str,
) -> Result<Option<Listing>, AppError> {
    let docs = txn.open_table(kind.table())?;
    get_doc(&docs, id)
}

fn write_listing_in(txn: &WriteTransaction, listing: &Listing) -> Result<(), AppError> {
    let json = to_json(listing)?;
    let mut docs = txn.open_table(listing.kind.table())?;
    docs.insert(listing.id.as_str(), json.as_str())?;
    Ok(())
}

/// Flats, services and messes, one table per kind.
pub struct ListingStore<'a> {
    db: &'a Database,
}

impl<'a> ListingStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn find_by_id(&self, kind: ListingKind, id: &str) -> Result<Listing, AppError> {
        let read_txn = self.db.begin_read()?;
        let docs = read_txn.open_table(kind.table())?;
        get_doc(&docs, id)?.ok_or_else(|| listing_not_found(kind))
    }

    pub fn find_by_owner(&self, kind: ListingKind, owner_id: &str) -> Result<Vec<Listing>, AppError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_LISTINGS_BY_OWNER)?;
        let docs = read_txn.open_table(kind.table())?;
        collect_indexed(&index, &docs, &format!("{kind}:{owner_id}"), 0, usize::MAX)
    }

    /// Every listing of `kind`, in key order.
    pub fn scan(&self, kind: ListingKind) -> Result<Vec<Listing>, AppError> {
        let read_txn = self.db.begin_read()?;
        let docs = read_txn.open_table(kind.table())?;

        let mut out: Vec<Listing> = Vec::new();
        for entry in docs.iter()? {
            let (_, value) = entry?;
            out.push(serde_json::from_str(value.value())?);
        }
        tracing::debug!(%kind, count = out.len(), "scanned listings");
        Ok(out)
    }

    pub fn find_by_status_and_coordinates_present(
        &self,
        kind: ListingKind,
        status: ListingStatus,
    ) -> Result<Vec<Listing>, AppError> {
        Ok(self
            .scan(kind)?
            .into_iter()
            .filter(|listing| listing.status == status && listing.coordinates().is_some())
            .collect())
    }

    /// Every image filename referenced by any listing, of any kind.
    pub fn referenced_images(&self) -> Result<HashSet<String>, AppError> {
        let mut in_use = HashSet::new();
        for kind in ListingKind::ALL {
            for listing in self.scan(kind)? {
                in_use.extend(listing.images);
            }
        }
        Ok(in_use)
    }

    /// Stores a freshly created listing.
    pub fn insert(&self, listing: &Listing) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            if load_listing_in(&write_txn, listing.kind, &listing.id)?.is_some() {
                return Err(AppError::Conflict);
            }
            write_listing_in(&write_txn, listing)?;

            let mut index = write_txn.open_table(TABLE_LISTINGS_BY_OWNER)?;
            index.insert(owner_key(listing).as_str(), listing.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Upserts the full document.
    ///
    /// `listing.version` must match the stored version, otherwise someone else
    /// wrote the document since it was read and the save fails with `Conflict`.
    /// The owner of an existing listing never changes. Returns the stored
    /// document with its bumped version.
    pub fn save(&self, listing: &Listing) -> Result<Listing, AppError> {
        let mut saved = listing.clone();

        let write_txn = self.db.begin_write()?;
        {
            match load_listing_in(&write_txn, listing.kind, &listing.id)? {
                Some(current) => {
                    if current.version != listing.version {
                        return Err(AppError::Conflict);
                    }
                    saved.owner_id = current.owner_id;
                }
                None => {
                    let mut index = write_txn.open_table(TABLE_LISTINGS_BY_OWNER)?;
                    index.insert(owner_key(&saved).as_str(), saved.id.as_str())?;
                }
            }
            saved.version = listing.version + 1;
            write_listing_in(&write_txn, &saved)?;
        }
        write_txn.commit()?;
        Ok(saved)
    }

    /// Read-modify-write of one listing inside a single write transaction.
    ///
    /// redb admits one writer at a time, so nothing can interleave between the
    /// read and the write. If `f` fails, nothing is written. `f` also receives
    /// the transaction, to write other documents atomically with the listing.
    pub fn modify<T>(
        &self,
        kind: ListingKind,
        id: &str,
        f: impl FnOnce(&mut Listing, &WriteTransaction) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let write_txn = self.db.begin_write()?;
        let mut listing =
            load_listing_in(&write_txn, kind, id)?.ok_or_else(|| listing_not_found(kind))?;

        let out = f(&mut listing, &write_txn)?;

        listing.version += 1;
        write_listing_in(&write_txn, &listing)?;
        write_txn.commit()?;
        Ok(out)
    }

    pub fn delete(&self, kind: ListingKind, id: &str) -> Result<Listing, AppError> {
        let write_txn = self.db.begin_write()?;
        let listing =
            load_listing_in(&write_txn, kind, id)?.ok_or_else(|| listing_not_found(kind))?;
        {
            let mut docs = write_txn.open_table(kind.table())?;
            docs.remove(id)?;

            let mut index = write_txn.open_table(TABLE_LISTINGS_BY_OWNER)?;
            index.remove(owner_key(&listing).as_str())?;
        }
        write_txn.commit()?;
        Ok(listing)
    }
}

fn user_key(user_id: &str, target_id: &str) -> String {
    format!("{user_id}:{target_id}")
}

fn target_key(rating: &Rating) -> String {
    format!(
        "{}:{}:{}:{}",
        rating.kind,
        rating.target_id,
        time_key(rating.created_at),
        rating.id
    )
}

pub struct RatingStore<'a> {
    db: &'a Database,
}

impl<'a> RatingStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Rating, AppError> {
        let read_txn = self.db.begin_read()?;
        let docs = read_txn.open_table(TABLE_RATINGS)?;
        get_doc(&docs, id)?.ok_or_else(|| AppError::NotFound("Rating".to_string()))
    }

    pub(crate) fn exists_in(
        txn: &WriteTransaction,
        user_id: &str,
        target_id: &str,
    ) -> Result<bool, AppError> {
        let index = txn.open_table(TABLE_RATINGS_BY_USER)?;
        let exists = index.get(user_key(user_id, target_id).as_str())?.is_some();
        Ok(exists)
    }

    pub(crate) fn insert_in(txn: &WriteTransaction, rating: &Rating) -> Result<(), AppError> {
        let json = to_json(rating)?;

        let mut docs = txn.open_table(TABLE_RATINGS)?;
        docs.insert(rating.id.as_str(), json.as_str())?;

        let mut by_user = txn.open_table(TABLE_RATINGS_BY_USER)?;
        by_user.insert(
            user_key(&rating.user_id, &rating.target_id).as_str(),
            rating.id.as_str(),
        )?;

        let mut by_target = txn.open_table(TABLE_RATINGS_BY_TARGET)?;
        by_target.insert(target_key(rating).as_str(), rating.id.as_str())?;
        Ok(())
    }

    /// Overwrites the stored rating. Indexed fields never change after creation.
    pub fn update(&self, rating: &Rating) -> Result<(), AppError> {
        let json = to_json(rating)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_RATINGS)?;
            docs.insert(rating.id.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn delete(&self, rating: &Rating) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_RATINGS)?;
            docs.remove(rating.id.as_str())?;

            let mut by_user = write_txn.open_table(TABLE_RATINGS_BY_USER)?;
            by_user.remove(user_key(&rating.user_id, &rating.target_id).as_str())?;

            let mut by_target = write_txn.open_table(TABLE_RATINGS_BY_TARGET)?;
            by_target.remove(target_key(rating).as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Ratings of a listing, oldest first.
    pub fn list_for_target(&self, kind: ListingKind, target_id: &str) -> Result<Vec<Rating>, AppError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_RATINGS_BY_TARGET)?;
        let docs = read_txn.open_table(TABLE_RATINGS)?;
        collect_indexed(&index, &docs, &format!("{kind}:{target_id}"), 0, usize::MAX)
    }

    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Rating>, AppError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_RATINGS_BY_USER)?;
        let docs = read_txn.open_table(TABLE_RATINGS)?;
        collect_indexed(&index, &docs, user_id, 0, usize::MAX)
    }

    /// Ids of every listing the user has rated.
    pub fn rated_target_ids(&self, user_id: &str) -> Result<HashSet<String>, AppError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_RATINGS_BY_USER)?;

        let (start, end) = prefix_range(user_id);
        let mut out = HashSet::new();
        for entry in index.range(start.as_str()..end.as_str())? {
            let (key, _) = entry?;
            if let Some(target_id) = key.value().strip_prefix(start.as_str()) {
                out.insert(target_id.to_string());
            }
        }
        Ok(out)
    }
}

fn contact_user_key(contact: &Contact) -> String {
    format!(
        "{}:{}:{}",
        contact.user_id,
        time_key(contact.created_at),
        contact.id
    )
}

pub struct ContactStore<'a> {
    db: &'a Database,
}

impl<'a> ContactStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Contact, AppError> {
        let read_txn = self.db.begin_read()?;
        let docs = read_txn.open_table(TABLE_CONTACTS)?;
        get_doc(&docs, id)?.ok_or_else(|| AppError::NotFound("Contact".to_string()))
    }

    pub(crate) fn insert_in(txn: &WriteTransaction, contact: &Contact) -> Result<(), AppError> {
        let json = to_json(contact)?;

        let mut docs = txn.open_table(TABLE_CONTACTS)?;
        docs.insert(contact.id.as_str(), json.as_str())?;

        let mut by_user = txn.open_table(TABLE_CONTACTS_BY_USER)?;
        by_user.insert(contact_user_key(contact).as_str(), contact.id.as_str())?;
        Ok(())
    }

    /// Contacts sent by `user_id`, oldest first.
    pub fn list_for_user(&self, user_id: &str, skip: usize, take: usize) -> Result<Vec<Contact>, AppError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_CONTACTS_BY_USER)?;
        let docs = read_txn.open_table(TABLE_CONTACTS)?;
        collect_indexed(&index, &docs, user_id, skip, take)
    }

    pub fn update(&self, contact: &Contact) -> Result<(), AppError> {
        let json = to_json(contact)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_CONTACTS)?;
            docs.insert(contact.id.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn delete(&self, contact: &Contact) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_CONTACTS)?;
            docs.remove(contact.id.as_str())?;

            let mut by_user = write_txn.open_table(TABLE_CONTACTS_BY_USER)?;
            by_user.remove(contact_user_key(contact).as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

pub struct UserStore<'a> {
    db: &'a Database,
}

impl<'a> UserStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn find(&self, id: &str) -> Result<Option<UserProfile>, AppError> {
        let read_txn = self.db.begin_read()?;
        let docs = read_txn.open_table(TABLE_USERS)?;
        get_doc(&docs, id)
    }

    pub fn upsert(&self, profile: &UserProfile) -> Result<(), AppError> {
        let json = to_json(profile)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_USERS)?;
            docs.insert(profile.id.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

fn requirement_user_key(requirement: &Requirement) -> String {
    format!(
        "{}:{}:{}",
        requirement.user_id,
        time_key(requirement.created_at),
        requirement.id
    )
}

pub struct RequirementStore<'a> {
    db: &'a Database,
}

impl<'a> RequirementStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Requirement, AppError> {
        let read_txn = self.db.begin_read()?;
        let docs = read_txn.open_table(TABLE_REQUIREMENTS)?;
        get_doc(&docs, id)?.ok_or_else(|| AppError::NotFound("Requirement".to_string()))
    }

    pub fn insert(&self, requirement: &Requirement) -> Result<(), AppError> {
        let json = to_json(requirement)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_REQUIREMENTS)?;
            docs.insert(requirement.id.as_str(), json.as_str())?;

            let mut by_user = write_txn.open_table(TABLE_REQUIREMENTS_BY_USER)?;
            by_user.insert(requirement_user_key(requirement).as_str(), requirement.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Overwrites the stored requirement. Poster and creation time never change.
    pub fn update(&self, requirement: &Requirement) -> Result<(), AppError> {
        let json = to_json(requirement)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_REQUIREMENTS)?;
            docs.insert(requirement.id.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn delete(&self, requirement: &Requirement) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut docs = write_txn.open_table(TABLE_REQUIREMENTS)?;
            docs.remove(requirement.id.as_str())?;

            let mut by_user = write_txn.open_table(TABLE_REQUIREMENTS_BY_USER)?;
            by_user.remove(requirement_user_key(requirement).as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Requirements posted by `user_id`, oldest first.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Requirement>, AppError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_REQUIREMENTS_BY_USER)?;
        let docs = read_txn.open_table(TABLE_REQUIREMENTS)?;
        collect_indexed(&index, &docs, user_id, 0, usize::MAX)
    }

    /// Requirements not yet fulfilled, oldest first.
    pub fn list_open(&self) -> Result<Vec<Requirement>, AppError> {
        let read_txn = self.db.begin_read()?;
        let docs = read_txn.open_table(TABLE_REQUIREMENTS)?;

        let mut out: Vec<Requirement> = Vec::new();
        for entry in docs.iter()? {
            let (_, value) = entry?;
            let requirement: Requirement = serde_json::from_str(value.value())?;
            if !requirement.fulfilled {
                out.push(requirement);
            }
        }
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }
}
