//! Embedded SQLite backend.
//!
//! Used when no hosted database is configured, and by the test suite through
//! [`SqliteStore::in_memory`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

use super::{FarmStore, StoreError, StoreResult};
use crate::models::{
    Account, ChatTurn, CropAdvisory, Farmer, NewChatTurn, NewPestDetection, NewSoilRecord,
    PestDetection, SoilRecord,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS farmers (
    id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL,
    location TEXT,
    farm_size REAL,
    primary_crops TEXT NOT NULL DEFAULT '[]',
    language_preference TEXT NOT NULL DEFAULT 'english',
    phone_number TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS farmer_accounts (
    email TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    farmer_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chat_history (
    id TEXT PRIMARY KEY,
    farmer_id TEXT NOT NULL,
    message TEXT NOT NULL,
    response TEXT NOT NULL,
    language TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_history_farmer ON chat_history(farmer_id);
CREATE TABLE IF NOT EXISTS soil_health_records (
    id TEXT PRIMARY KEY,
    farmer_id TEXT NOT NULL,
    ph_level REAL NOT NULL,
    nitrogen_level TEXT NOT NULL,
    phosphorus_level TEXT NOT NULL,
    potassium_level TEXT NOT NULL,
    organic_matter REAL NOT NULL,
    recommendations TEXT NOT NULL,
    test_date TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_soil_farmer ON soil_health_records(farmer_id);
CREATE TABLE IF NOT EXISTS pest_detections (
    id TEXT PRIMARY KEY,
    farmer_id TEXT NOT NULL,
    crop_type TEXT NOT NULL,
    pest_identified TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    treatment_recommendations TEXT NOT NULL,
    image_url TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pest_farmer ON pest_detections(farmer_id);
CREATE TABLE IF NOT EXISTS crop_advisories (
    id TEXT PRIMARY KEY,
    farmer_id TEXT NOT NULL,
    crop_type TEXT NOT NULL,
    advisory_text TEXT NOT NULL,
    advisory_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_advisory_farmer ON crop_advisories(farmer_id);
";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        info!(path = %path.display(), "Opening SQLite farmer store");
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Advisories are authored outside this service; this seeds them locally.
    pub fn insert_crop_advisory(
        &self,
        farmer_id: &str,
        crop_type: &str,
        advisory_type: &str,
        advisory_text: &str,
    ) -> StoreResult<CropAdvisory> {
        let advisory = CropAdvisory {
            id: Uuid::new_v4().to_string(),
            farmer_id: farmer_id.to_string(),
            crop_type: crop_type.to_string(),
            advisory_text: advisory_text.to_string(),
            advisory_type: advisory_type.to_string(),
            created_at: Utc::now(),
        };
        self.lock()?.execute(
            "INSERT INTO crop_advisories (id, farmer_id, crop_type, advisory_text, advisory_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                advisory.id,
                advisory.farmer_id,
                advisory.crop_type,
                advisory.advisory_text,
                advisory.advisory_type,
                advisory.created_at.to_rfc3339(),
            ],
        )?;
        Ok(advisory)
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(StoreError::Corrupt(message)),
    )
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("timestamp '{}': {}", raw, e)))
}

fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| conversion_error(idx, format!("value '{}': {}", raw, e)))
}

fn farmer_from_row(row: &Row<'_>) -> rusqlite::Result<Farmer> {
    let crops_raw: String = row.get(4)?;
    let primary_crops: Vec<String> = serde_json::from_str(&crops_raw)
        .map_err(|e| conversion_error(4, format!("primary_crops: {}", e)))?;
    Ok(Farmer {
        id: row.get(0)?,
        full_name: row.get(1)?,
        location: row.get(2)?,
        farm_size: row.get(3)?,
        primary_crops,
        language_preference: row.get(5)?,
        phone_number: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

fn chat_turn_from_row(row: &Row<'_>) -> rusqlite::Result<ChatTurn> {
    Ok(ChatTurn {
        id: row.get(0)?,
        farmer_id: row.get(1)?,
        message: row.get(2)?,
        response: row.get(3)?,
        language: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

fn soil_record_from_row(row: &Row<'_>) -> rusqlite::Result<SoilRecord> {
    Ok(SoilRecord {
        id: row.get(0)?,
        farmer_id: row.get(1)?,
        ph_level: row.get(2)?,
        nitrogen_level: parsed_at(row, 3)?,
        phosphorus_level: parsed_at(row, 4)?,
        potassium_level: parsed_at(row, 5)?,
        organic_matter: row.get(6)?,
        recommendations: row.get(7)?,
        test_date: parsed_at::<NaiveDate>(row, 8)?,
        created_at: timestamp_at(row, 9)?,
    })
}

fn pest_detection_from_row(row: &Row<'_>) -> rusqlite::Result<PestDetection> {
    Ok(PestDetection {
        id: row.get(0)?,
        farmer_id: row.get(1)?,
        crop_type: row.get(2)?,
        pest_identified: row.get(3)?,
        confidence_score: row.get(4)?,
        treatment_recommendations: row.get(5)?,
        image_url: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

fn crop_advisory_from_row(row: &Row<'_>) -> rusqlite::Result<CropAdvisory> {
    Ok(CropAdvisory {
        id: row.get(0)?,
        farmer_id: row.get(1)?,
        crop_type: row.get(2)?,
        advisory_text: row.get(3)?,
        advisory_type: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

#[async_trait]
impl FarmStore for SqliteStore {
    async fn get_farmer(&self, id: &str) -> StoreResult<Option<Farmer>> {
        let conn = self.lock()?;
        let farmer = conn
            .query_row(
                "SELECT id, full_name, location, farm_size, primary_crops, language_preference,
                        phone_number, created_at, updated_at
                 FROM farmers WHERE id = ?1",
                params![id],
                farmer_from_row,
            )
            .optional()?;
        Ok(farmer)
    }

    async fn upsert_farmer(&self, farmer: &Farmer) -> StoreResult<()> {
        let crops = serde_json::to_string(&farmer.primary_crops)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.lock()?.execute(
            "INSERT INTO farmers (id, full_name, location, farm_size, primary_crops, language_preference,
                                  phone_number, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                location = excluded.location,
                farm_size = excluded.farm_size,
                primary_crops = excluded.primary_crops,
                language_preference = excluded.language_preference,
                phone_number = excluded.phone_number,
                updated_at = excluded.updated_at",
            params![
                farmer.id,
                farmer.full_name,
                farmer.location,
                farmer.farm_size,
                crops,
                farmer.language_preference,
                farmer.phone_number,
                farmer.created_at.to_rfc3339(),
                farmer.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        let result = self.lock()?.execute(
            "INSERT INTO farmer_accounts (email, password_hash, farmer_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                account.email,
                account.password_hash,
                account.farmer_id,
                account.created_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Conflict(account.email.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_account(&self, email: &str) -> StoreResult<Option<Account>> {
        let conn = self.lock()?;
        let account = conn
            .query_row(
                "SELECT email, password_hash, farmer_id, created_at FROM farmer_accounts WHERE email = ?1",
                params![email],
                |row| {
                    Ok(Account {
                        email: row.get(0)?,
                        password_hash: row.get(1)?,
                        farmer_id: row.get(2)?,
                        created_at: timestamp_at(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    async fn insert_chat_turn(&self, turn: &NewChatTurn) -> StoreResult<ChatTurn> {
        let stored = ChatTurn {
            id: Uuid::new_v4().to_string(),
            farmer_id: turn.farmer_id.clone(),
            message: turn.message.clone(),
            response: turn.response.clone(),
            language: turn.language.clone(),
            created_at: Utc::now(),
        };
        self.lock()?.execute(
            "INSERT INTO chat_history (id, farmer_id, message, response, language, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stored.id,
                stored.farmer_id,
                stored.message,
                stored.response,
                stored.language,
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(stored)
    }

    async fn list_chat_turns(&self, farmer_id: &str, limit: usize) -> StoreResult<Vec<ChatTurn>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, farmer_id, message, response, language, created_at
             FROM chat_history
             WHERE farmer_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![farmer_id, limit as i64], chat_turn_from_row)?;
        let turns = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(turns)
    }

    async fn insert_soil_record(&self, record: &NewSoilRecord) -> StoreResult<SoilRecord> {
        let stored = SoilRecord {
            id: Uuid::new_v4().to_string(),
            farmer_id: record.farmer_id.clone(),
            ph_level: record.ph_level,
            nitrogen_level: record.nitrogen_level,
            phosphorus_level: record.phosphorus_level,
            potassium_level: record.potassium_level,
            organic_matter: record.organic_matter,
            recommendations: record.recommendations.clone(),
            test_date: record.test_date,
            created_at: Utc::now(),
        };
        self.lock()?.execute(
            "INSERT INTO soil_health_records (id, farmer_id, ph_level, nitrogen_level, phosphorus_level,
                                              potassium_level, organic_matter, recommendations, test_date,
                                              created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                stored.id,
                stored.farmer_id,
                stored.ph_level,
                stored.nitrogen_level.as_str(),
                stored.phosphorus_level.as_str(),
                stored.potassium_level.as_str(),
                stored.organic_matter,
                stored.recommendations,
                stored.test_date.to_string(),
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(stored)
    }

    async fn list_soil_records(&self, farmer_id: &str) -> StoreResult<Vec<SoilRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, farmer_id, ph_level, nitrogen_level, phosphorus_level, potassium_level,
                    organic_matter, recommendations, test_date, created_at
             FROM soil_health_records
             WHERE farmer_id = ?1
             ORDER BY test_date DESC, created_at DESC",
        )?;
        let rows = stmt.query_map(params![farmer_id], soil_record_from_row)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn insert_pest_detection(&self, detection: &NewPestDetection) -> StoreResult<PestDetection> {
        let stored = PestDetection {
            id: Uuid::new_v4().to_string(),
            farmer_id: detection.farmer_id.clone(),
            crop_type: detection.crop_type.clone(),
            pest_identified: detection.pest_identified.clone(),
            confidence_score: detection.confidence_score,
            treatment_recommendations: detection.treatment_recommendations.clone(),
            image_url: detection.image_url.clone(),
            created_at: Utc::now(),
        };
        self.lock()?.execute(
            "INSERT INTO pest_detections (id, farmer_id, crop_type, pest_identified, confidence_score,
                                          treatment_recommendations, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                stored.id,
                stored.farmer_id,
                stored.crop_type,
                stored.pest_identified,
                stored.confidence_score,
                stored.treatment_recommendations,
                stored.image_url,
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(stored)
    }

    async fn list_pest_detections(&self, farmer_id: &str, limit: usize) -> StoreResult<Vec<PestDetection>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, farmer_id, crop_type, pest_identified, confidence_score, treatment_recommendations,
                    image_url, created_at
             FROM pest_detections
             WHERE farmer_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![farmer_id, limit as i64], pest_detection_from_row)?;
        let detections = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(detections)
    }

    async fn list_crop_advisories(&self, farmer_id: &str) -> StoreResult<Vec<CropAdvisory>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, farmer_id, crop_type, advisory_text, advisory_type, created_at
             FROM crop_advisories
             WHERE farmer_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![farmer_id], crop_advisory_from_row)?;
        let advisories = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(advisories)
    }
}
