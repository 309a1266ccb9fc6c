//! SQLite database with Diesel ORM
//!
//! Stores pets, lineage requests, materialized parent pointers, breeding
//! events and adoption listings. The schema is created idempotently at open.

use crate::error::{AppError, DbError, Result};
use crate::schema::*;
use crate::types::{AdoptionStatus, NotificationType, RequestStatus, Role, Sex};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::path::Path;

/// Walk up directory tree to find .breeders-room folder (like git finds .git)
/// Can be overridden with BREEDERS_ROOM_DB_PATH env var
fn get_db_path() -> std::path::PathBuf {
    // Check env var first - always takes priority
    if let Ok(path) = std::env::var("BREEDERS_ROOM_DB_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let data_dir = dir.join(".breeders-room");
            if data_dir.is_dir() {
                return data_dir.join("breeders-room.db");
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    // Nothing found - default to current directory
    // (breeders-room init will create it here)
    std::path::PathBuf::from(".breeders-room/breeders-room.db")
}

/// Current schema version
pub const CURRENT_SCHEMA: RoomSchema = RoomSchema {
    major: 1,
    minor: 2,
    patch: 0,
    name: "breeding-records",
    features: &[
        "pets",
        "parent_requests",
        "pet_relations",
        "pairs",
        "matings",
        "layings",
        "adoptions",
        "notifications",
    ],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct RoomSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl RoomSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&feature)
    }
}

impl std::fmt::Display for RoomSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable schema version
#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
pub struct NewSchemaVersion<'a> {
    pub version: &'a str,
    pub name: &'a str,
    pub features: &'a str,
    pub introduced_at: &'a str,
}

/// Queryable pet
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = pets)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: i32,
    pub owner_id: Option<String>,
    pub name: String,
    pub species: String,
    pub sex: String,
    pub morphs_json: String,
    pub traits_json: String,
    pub hatching_date: Option<String>,
    pub weight: Option<f64>,
    pub laying_id: Option<i32>,
    pub is_public: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Pet {
    /// True when `user` is present and owns this pet
    pub fn is_owned_by(&self, user: Option<&str>) -> bool {
        match (self.owner_id.as_deref(), user) {
            (Some(owner), Some(user)) => owner == user,
            _ => false,
        }
    }

    pub fn sex(&self) -> Sex {
        // CHECK constraint keeps stored values parseable
        self.sex.parse().unwrap_or(Sex::Unknown)
    }
}

/// Insertable pet
#[derive(Insertable)]
#[diesel(table_name = pets)]
pub struct NewPet<'a> {
    pub owner_id: Option<&'a str>,
    pub name: &'a str,
    pub species: &'a str,
    pub sex: &'a str,
    pub morphs_json: &'a str,
    pub traits_json: &'a str,
    pub hatching_date: Option<&'a str>,
    pub weight: Option<f64>,
    pub laying_id: Option<i32>,
    pub is_public: bool,
    pub is_deleted: bool,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable parent request (a proposed lineage edge)
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = parent_requests)]
#[serde(rename_all = "camelCase")]
pub struct ParentRequest {
    pub id: i32,
    pub requester_id: String,
    pub child_pet_id: i32,
    pub parent_pet_id: i32,
    pub role: String,
    pub status: String,
    pub message: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ParentRequest {
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::Father)
    }

    pub fn status(&self) -> RequestStatus {
        self.status.parse().unwrap_or(RequestStatus::Deleted)
    }
}

/// Insertable parent request
#[derive(Insertable)]
#[diesel(table_name = parent_requests)]
pub struct NewParentRequest<'a> {
    pub requester_id: &'a str,
    pub child_pet_id: i32,
    pub parent_pet_id: i32,
    pub role: &'a str,
    pub status: &'a str,
    pub message: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Materialized father/mother pointers for one pet
#[derive(Queryable, Selectable, Debug, Clone, Default, PartialEq, Serialize)]
#[diesel(table_name = pet_relations)]
#[serde(rename_all = "camelCase")]
pub struct PetRelation {
    pub pet_id: i32,
    pub father_id: Option<i32>,
    pub mother_id: Option<i32>,
    pub updated_at: String,
}

impl PetRelation {
    pub fn parent(&self, role: Role) -> Option<i32> {
        match role {
            Role::Father => self.father_id,
            Role::Mother => self.mother_id,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = pet_relations)]
pub struct NewPetRelation<'a> {
    pub pet_id: i32,
    pub father_id: Option<i32>,
    pub mother_id: Option<i32>,
    pub updated_at: &'a str,
}

/// Long-lived breeding pair declaration
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = pairs)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub id: i32,
    pub owner_id: String,
    pub species: String,
    pub father_id: i32,
    pub mother_id: i32,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = pairs)]
pub struct NewPair<'a> {
    pub owner_id: &'a str,
    pub species: &'a str,
    pub father_id: i32,
    pub mother_id: i32,
    pub created_at: &'a str,
}

/// A single mating event of a pair
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = matings)]
#[serde(rename_all = "camelCase")]
pub struct Mating {
    pub id: i32,
    pub pair_id: i32,
    pub father_id: i32,
    pub mother_id: i32,
    pub mating_date: String,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = matings)]
pub struct NewMating<'a> {
    pub pair_id: i32,
    pub father_id: i32,
    pub mother_id: i32,
    pub mating_date: &'a str,
    pub created_at: &'a str,
}

/// A clutch laid after a mating
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = layings)]
#[serde(rename_all = "camelCase")]
pub struct Laying {
    pub id: i32,
    pub mating_id: i32,
    pub laying_date: String,
    pub clutch: i32,
    pub egg_count: Option<i32>,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = layings)]
pub struct NewLaying<'a> {
    pub mating_id: i32,
    pub laying_date: &'a str,
    pub clutch: i32,
    pub egg_count: Option<i32>,
    pub created_at: &'a str,
}

/// Adoption listing
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = adoptions)]
#[serde(rename_all = "camelCase")]
pub struct Adoption {
    pub id: i32,
    pub pet_id: i32,
    pub seller_id: String,
    pub buyer_id: Option<String>,
    pub status: String,
    pub price: Option<i32>,
    pub adoption_date: Option<String>,
    pub memo: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Adoption {
    pub fn status(&self) -> AdoptionStatus {
        self.status.parse().unwrap_or(AdoptionStatus::Nfs)
    }
}

#[derive(Insertable)]
#[diesel(table_name = adoptions)]
pub struct NewAdoption<'a> {
    pub pet_id: i32,
    pub seller_id: &'a str,
    pub status: &'a str,
    pub price: Option<i32>,
    pub memo: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Stored notification
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = notifications)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i32,
    pub receiver_id: String,
    pub notification_type: String,
    pub target_id: i32,
    pub detail_json: String,
    pub is_read: bool,
    pub created_at: String,
}

impl Notification {
    pub fn kind(&self) -> Option<NotificationType> {
        self.notification_type.parse().ok()
    }
}

#[derive(Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification<'a> {
    pub receiver_id: &'a str,
    pub notification_type: &'a str,
    pub target_id: i32,
    pub detail_json: &'a str,
    pub is_read: bool,
    pub created_at: &'a str,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection SQLite settings applied when the pool hands out a connection
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> std::path::PathBuf {
        get_db_path()
    }

    /// Create a new database at a custom path
    pub fn new(path: &str) -> Result<Self> {
        Self::open_at(path)
    }

    /// Open database at default path (respects BREEDERS_ROOM_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::Connection(format!("{}: {}", parent.display(), e)))?;
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(8)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        tracing::debug!(path = %path_str, schema = %CURRENT_SCHEMA, "database opened");
        Ok(db)
    }

    fn get_conn(&self) -> std::result::Result<DbConn, DbError> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// The write lock is taken up front, so check-then-write sequences inside
    /// `f` cannot interleave with another writer. Any `Err` rolls back.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        let mut conn = self.get_conn()?;
        conn.immediate_transaction(f)
    }

    /// Run `f` inside a read transaction so multi-query reads see one snapshot
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        let mut pooled = self.get_conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.transaction(f)
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS pets (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                owner_id TEXT,
                name TEXT NOT NULL,
                species TEXT NOT NULL,
                sex TEXT NOT NULL DEFAULT 'UNKNOWN' CHECK (sex IN ('MALE', 'FEMALE', 'UNKNOWN')),
                morphs_json TEXT NOT NULL DEFAULT '[]',
                traits_json TEXT NOT NULL DEFAULT '[]',
                hatching_date TEXT,
                weight REAL,
                laying_id INTEGER,
                is_public BOOLEAN NOT NULL DEFAULT 1,
                is_deleted BOOLEAN NOT NULL DEFAULT 0,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (laying_id) REFERENCES layings(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS parent_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                requester_id TEXT NOT NULL,
                child_pet_id INTEGER NOT NULL,
                parent_pet_id INTEGER NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('FATHER', 'MOTHER')),
                status TEXT NOT NULL DEFAULT 'PENDING'
                    CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED', 'CANCELLED', 'DELETED')),
                message TEXT,
                reject_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (child_pet_id) REFERENCES pets(id),
                FOREIGN KEY (parent_pet_id) REFERENCES pets(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS pet_relations (
                pet_id INTEGER PRIMARY KEY NOT NULL,
                father_id INTEGER,
                mother_id INTEGER,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (pet_id) REFERENCES pets(id),
                FOREIGN KEY (father_id) REFERENCES pets(id),
                FOREIGN KEY (mother_id) REFERENCES pets(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                owner_id TEXT NOT NULL,
                species TEXT NOT NULL,
                father_id INTEGER NOT NULL,
                mother_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (father_id) REFERENCES pets(id),
                FOREIGN KEY (mother_id) REFERENCES pets(id),
                UNIQUE(owner_id, father_id, mother_id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS matings (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                pair_id INTEGER NOT NULL,
                father_id INTEGER NOT NULL,
                mother_id INTEGER NOT NULL,
                mating_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (pair_id) REFERENCES pairs(id),
                UNIQUE(pair_id, mating_date)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS layings (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                mating_id INTEGER NOT NULL,
                laying_date TEXT NOT NULL,
                clutch INTEGER NOT NULL,
                egg_count INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (mating_id) REFERENCES matings(id),
                UNIQUE(mating_id, laying_date)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS adoptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                pet_id INTEGER NOT NULL,
                seller_id TEXT NOT NULL,
                buyer_id TEXT,
                status TEXT NOT NULL CHECK (status IN ('NFS', 'ON_SALE', 'ON_RESERVATION', 'SOLD')),
                price INTEGER,
                adoption_date TEXT,
                memo TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (pet_id) REFERENCES pets(id),
                CHECK (buyer_id IS NULL OR status IN ('ON_RESERVATION', 'SOLD'))
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                receiver_id TEXT NOT NULL,
                notification_type TEXT NOT NULL,
                target_id INTEGER NOT NULL,
                detail_json TEXT NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        // One open proposal per lineage edge, one active listing per pet
        diesel::sql_query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_parent_requests_one_pending \
             ON parent_requests(child_pet_id, parent_pet_id, role) WHERE status = 'PENDING'"
        ).execute(&mut conn)?;
        diesel::sql_query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_adoptions_one_active \
             ON adoptions(pet_id) WHERE status != 'SOLD'"
        ).execute(&mut conn)?;

        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_pets_owner ON pets(owner_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_pets_laying ON pets(laying_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_requests_child ON parent_requests(child_pet_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_requests_parent ON parent_requests(parent_pet_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_relations_parents ON pet_relations(father_id, mother_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_matings_pair ON matings(pair_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_layings_mating ON layings(mating_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_notifications_receiver ON notifications(receiver_id)").execute(&mut conn)?;

        Self::register_schema(&mut conn, &CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(conn: &mut SqliteConnection, schema: &RoomSchema) -> Result<()> {
        let now = now();
        let features_json = serde_json::to_string(&schema.features).unwrap_or_default();

        let new_schema = NewSchemaVersion {
            version: &schema.version_string(),
            name: schema.name,
            features: &features_json,
            introduced_at: &now,
        };

        diesel::insert_or_ignore_into(schema_versions::table)
            .values(&new_schema)
            .execute(conn)?;

        Ok(())
    }

    /// Latest registered schema version string
    pub fn stored_schema_version(&self) -> Result<Option<String>> {
        self.read(|conn| {
            Ok(schema_versions::table
                .select(schema_versions::version)
                .order(schema_versions::id.desc())
                .first::<String>(conn)
                .optional()?)
        })
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Current timestamp in the format stored in every `*_at` column
pub(crate) fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Today's date as `YYYY-MM-DD`
pub(crate) fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Rowid of the last insert on this connection
pub(crate) fn last_insert_id(conn: &mut SqliteConnection) -> QueryResult<i32> {
    diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .first(conn)
}

/// Validate a `YYYY-MM-DD` date, returning it normalized
pub(crate) fn parse_date(field: &str, value: &str) -> Result<String> {
    chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| AppError::BadRequest(format!("{} must be a YYYY-MM-DD date, got '{}'", field, value)))
}

/// Load a pet that must exist (deleted pets included)
pub(crate) fn load_pet(conn: &mut SqliteConnection, pet_id: i32) -> Result<Pet> {
    pets::table
        .find(pet_id)
        .first::<Pet>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Pet", pet_id))
}

/// Load a pet by id if present
pub(crate) fn find_pet(conn: &mut SqliteConnection, pet_id: i32) -> QueryResult<Option<Pet>> {
    pets::table.find(pet_id).first::<Pet>(conn).optional()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A database in a temp directory that lives as long as the returned guard
    pub fn temp_db() -> (Database, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::open_at(dir.path().join("test.db")).expect("open db");
        (db, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_db;
    use super::*;

    #[test]
    fn test_schema_is_registered_once() {
        let (db, dir) = temp_db();
        assert_eq!(db.stored_schema_version().unwrap(), Some(CURRENT_SCHEMA.version_string()));

        // Reopening is idempotent
        let reopened = Database::open_at(dir.path().join("test.db")).unwrap();
        assert_eq!(reopened.stored_schema_version().unwrap(), Some(CURRENT_SCHEMA.version_string()));
    }

    #[test]
    fn test_schema_features() {
        assert!(CURRENT_SCHEMA.has_feature("pet_relations"));
        assert!(!CURRENT_SCHEMA.has_feature("auctions"));
        assert_eq!(CURRENT_SCHEMA.to_string(), "v1.2.0 (breeding-records)");
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let (db, _dir) = temp_db();
        let result: Result<()> = db.write(|conn| {
            let now = now();
            diesel::insert_into(pets::table)
                .values(&NewPet {
                    owner_id: Some("keeper"),
                    name: "Ghost",
                    species: "leopard gecko",
                    sex: "MALE",
                    morphs_json: "[]",
                    traits_json: "[]",
                    hatching_date: None,
                    weight: None,
                    laying_id: None,
                    is_public: true,
                    is_deleted: false,
                    created_at: &now,
                    updated_at: &now,
                })
                .execute(conn)?;
            Err(AppError::BadRequest("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db.read(|conn| Ok(pets::table.count().get_result(conn)?)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("matingDate", "2024-03-01").unwrap(), "2024-03-01");
        assert!(matches!(parse_date("matingDate", "03/01/2024"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_is_owned_by() {
        let (db, _dir) = temp_db();
        let pet = db
            .write(|conn| {
                let now = now();
                diesel::insert_into(pets::table)
                    .values(&NewPet {
                        owner_id: Some("keeper"),
                        name: "Ghost",
                        species: "leopard gecko",
                        sex: "MALE",
                        morphs_json: "[]",
                        traits_json: "[]",
                        hatching_date: None,
                        weight: None,
                        laying_id: None,
                        is_public: true,
                        is_deleted: false,
                        created_at: &now,
                        updated_at: &now,
                    })
                    .execute(conn)?;
                let id = last_insert_id(conn)?;
                load_pet(conn, id)
            })
            .unwrap();
        assert!(pet.is_owned_by(Some("keeper")));
        assert!(!pet.is_owned_by(Some("visitor")));
        assert!(!pet.is_owned_by(None));
        assert_eq!(pet.sex(), Sex::Male);
    }
}
