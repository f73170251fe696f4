//! Farmer profile store.
//!
//! Two backends sit behind [`FarmStore`]: the hosted Supabase (PostgREST)
//! database and an embedded SQLite file. Handlers only ever see the trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Account, ChatTurn, CropAdvisory, Farmer, NewChatTurn, NewPestDetection, NewSoilRecord,
    PestDetection, SoilRecord,
};

pub mod sqlite;
pub mod supabase;

pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait FarmStore: Send + Sync {
    async fn get_farmer(&self, id: &str) -> StoreResult<Option<Farmer>>;

    /// Inserts the profile or replaces the existing row with the same id.
    async fn upsert_farmer(&self, farmer: &Farmer) -> StoreResult<()>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_account(&self, account: &Account) -> StoreResult<()>;

    async fn find_account(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn insert_chat_turn(&self, turn: &NewChatTurn) -> StoreResult<ChatTurn>;

    /// Newest first.
    async fn list_chat_turns(&self, farmer_id: &str, limit: usize) -> StoreResult<Vec<ChatTurn>>;

    async fn insert_soil_record(&self, record: &NewSoilRecord) -> StoreResult<SoilRecord>;

    /// Ordered by test date, newest first.
    async fn list_soil_records(&self, farmer_id: &str) -> StoreResult<Vec<SoilRecord>>;

    async fn insert_pest_detection(&self, detection: &NewPestDetection) -> StoreResult<PestDetection>;

    async fn list_pest_detections(&self, farmer_id: &str, limit: usize) -> StoreResult<Vec<PestDetection>>;

    async fn list_crop_advisories(&self, farmer_id: &str) -> StoreResult<Vec<CropAdvisory>>;
}
