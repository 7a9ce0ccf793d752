//! Database initialization and table definitions
//!
//! This module handles the setup of the embedded redb database and the
//! application state shared by every request handler. Documents are stored as
//! JSON strings keyed by id; secondary lookups go through index tables whose
//! composite keys (`"{a}:{b}:..."`) are scanned with prefix ranges.

use redb::{Database, TableDefinition};
use std::sync::Arc;

use crate::auth::{AuthProvider, JwtAuth};
use crate::blob::{BlobStore, DiskBlobStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, DuplicatePolicy};

/// Flat listings. Key: listing id, value: JSON `Listing`
pub const TABLE_FLATS: TableDefinition<&str, &str> = TableDefinition::new("flats_v1");

/// Service listings. Key: listing id, value: JSON `Listing`
pub const TABLE_SERVICES: TableDefinition<&str, &str> = TableDefinition::new("services_v1");

/// Mess listings. Key: listing id, value: JSON `Listing`
pub const TABLE_MESSES: TableDefinition<&str, &str> = TableDefinition::new("messes_v1");

/// Listings by owner
///
/// Key: `"{kind}:{owner_id}:{listing_id}"`, value: listing id
pub const TABLE_LISTINGS_BY_OWNER: TableDefinition<&str, &str> =
    TableDefinition::new("listings_owner_index_v1");

/// Ratings. Key: rating id, value: JSON `Rating`
pub const TABLE_RATINGS: TableDefinition<&str, &str> = TableDefinition::new("ratings_v1");

/// One entry per (user, target) pair, which is what makes a rating unique
///
/// Key: `"{user_id}:{target_id}"`, value: rating id
pub const TABLE_RATINGS_BY_USER: TableDefinition<&str, &str> =
    TableDefinition::new("ratings_user_index_v1");

/// Ratings of a listing in creation order
///
/// Key: `"{kind}:{target_id}:{created_micros}:{rating_id}"`, value: rating id
pub const TABLE_RATINGS_BY_TARGET: TableDefinition<&str, &str> =
    TableDefinition::new("ratings_target_index_v1");

/// Contact inbox records. Key: contact id, value: JSON `Contact`
pub const TABLE_CONTACTS: TableDefinition<&str, &str> = TableDefinition::new("contacts_v1");

/// Contacts by sender in creation order
///
/// Key: `"{user_id}:{created_micros}:{contact_id}"`, value: contact id
pub const TABLE_CONTACTS_BY_USER: TableDefinition<&str, &str> =
    TableDefinition::new("contacts_user_index_v1");

/// User profiles. Key: user id, value: JSON `UserProfile`
pub const TABLE_USERS: TableDefinition<&str, &str> = TableDefinition::new("users_v1");

/// Housing requirements. Key: requirement id, value: JSON `Requirement`
pub const TABLE_REQUIREMENTS: TableDefinition<&str, &str> =
    TableDefinition::new("requirements_v1");

/// Requirements by poster in creation order
///
/// Key: `"{user_id}:{created_micros}:{requirement_id}"`, value: requirement id
pub const TABLE_REQUIREMENTS_BY_USER: TableDefinition<&str, &str> =
    TableDefinition::new("requirements_user_index_v1");

const ALL_TABLES: [TableDefinition<&str, &str>; 12] = [
    TABLE_FLATS,
    TABLE_SERVICES,
    TABLE_MESSES,
    TABLE_LISTINGS_BY_OWNER,
    TABLE_RATINGS,
    TABLE_RATINGS_BY_USER,
    TABLE_RATINGS_BY_TARGET,
    TABLE_CONTACTS,
    TABLE_CONTACTS_BY_USER,
    TABLE_USERS,
    TABLE_REQUIREMENTS,
    TABLE_REQUIREMENTS_BY_USER,
];

/// Behaviour switches read from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Default radius of proximity queries, in kilometers
    pub nearby_radius_km: f64,
    /// Policy of the generic contact endpoint towards repeated contacts
    pub contact_duplicates: DuplicatePolicy,
}

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub auth: Arc<dyn AuthProvider>,
    pub clock: Arc<dyn Clock>,
    pub blobs: Arc<dyn BlobStore>,
    pub settings: Settings,
}

impl AppState {
    /// Wires the default collaborators (JWT auth, system clock, upload directory).
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db: Arc::new(db),
            auth: Arc::new(JwtAuth::new(&config.jwt_secret)),
            clock: Arc::new(SystemClock),
            blobs: Arc::new(DiskBlobStore::new(&config.upload_dir)),
            settings: Settings {
                nearby_radius_km: config.nearby_radius_km,
                contact_duplicates: config.contact_duplicates,
            },
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Initializes the embedded database and creates required tables
///
/// # Example
///
/// ```no_run
/// # use nestmate::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    // Create or open the database file
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        for table in ALL_TABLES {
            write_txn.open_table(table)?;
        }
    }
    write_txn.commit()?;

    Ok(db)
}
