//! Hosted Supabase backend, spoken to through its PostgREST interface.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{FarmStore, StoreError, StoreResult};
use crate::config::SupabaseConfig;
use crate::models::{
    default_language, Account, ChatTurn, CropAdvisory, Farmer, NewChatTurn, NewPestDetection,
    NewSoilRecord, NutrientLevel, PestDetection, SoilRecord,
};

pub struct SupabaseStore {
    http_client: Client,
    rest_url: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct FarmerRow {
    id: String,
    full_name: String,
    location: Option<String>,
    farm_size: Option<f64>,
    #[serde(default)]
    primary_crops: Option<Vec<String>>,
    language_preference: Option<String>,
    phone_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<FarmerRow> for Farmer {
    fn from(row: FarmerRow) -> Self {
        Farmer {
            id: row.id,
            full_name: row.full_name,
            location: row.location,
            farm_size: row.farm_size,
            primary_crops: row.primary_crops.unwrap_or_default(),
            language_preference: row.language_preference.unwrap_or_else(default_language),
            phone_number: row.phone_number,
            created_at: row.created_at,
            updated_at: row.updated_at.unwrap_or(row.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    email: String,
    password_hash: String,
    farmer_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ChatTurnRow {
    id: String,
    farmer_id: String,
    message: String,
    response: String,
    language: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SoilRecordRow {
    id: String,
    farmer_id: String,
    ph_level: f64,
    nitrogen_level: NutrientLevel,
    phosphorus_level: NutrientLevel,
    potassium_level: NutrientLevel,
    organic_matter: f64,
    recommendations: String,
    test_date: NaiveDate,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PestDetectionRow {
    id: String,
    farmer_id: String,
    crop_type: String,
    pest_identified: String,
    confidence_score: f64,
    treatment_recommendations: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CropAdvisoryRow {
    id: String,
    farmer_id: String,
    crop_type: String,
    advisory_text: String,
    advisory_type: String,
    created_at: DateTime<Utc>,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig, http_client: Client) -> Self {
        info!(url = %config.url, "Using Supabase farmer store");
        Self {
            http_client,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            service_key: config.service_key.clone(),
        }
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}", self.rest_url, table);
        if !query.is_empty() {
            let parts: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            url.push('?');
            url.push_str(&parts.join("&"));
        }
        url
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> StoreResult<Vec<T>> {
        let url = self.table_url(table, query);
        debug!(url = %url, "Supabase select");
        let response = self.authed(self.http_client.get(&url)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    async fn insert_returning<T: DeserializeOwned>(&self, table: &str, row: serde_json::Value) -> StoreResult<T> {
        let url = self.table_url(table, &[]);
        let response = self
            .authed(self.http_client.post(&url))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let response = check_status(response).await?;
        let mut rows = response.json::<Vec<T>>().await?;
        if rows.is_empty() {
            return Err(StoreError::Corrupt(format!("insert into {} returned no rows", table)));
        }
        Ok(rows.remove(0))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", utf8_percent_encode(value, NON_ALPHANUMERIC))
}

async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Backend {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl FarmStore for SupabaseStore {
    async fn get_farmer(&self, id: &str) -> StoreResult<Option<Farmer>> {
        let rows: Vec<FarmerRow> = self
            .select("farmers", &[("select", "*".to_string()), ("id", eq(id)), ("limit", "1".to_string())])
            .await?;
        Ok(rows.into_iter().next().map(Farmer::from))
    }

    async fn upsert_farmer(&self, farmer: &Farmer) -> StoreResult<()> {
        let url = self.table_url("farmers", &[]);
        let response = self
            .authed(self.http_client.post(&url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!({
                "id": farmer.id,
                "full_name": farmer.full_name,
                "location": farmer.location,
                "farm_size": farmer.farm_size,
                "primary_crops": farmer.primary_crops,
                "language_preference": farmer.language_preference,
                "phone_number": farmer.phone_number,
                "created_at": farmer.created_at,
                "updated_at": farmer.updated_at,
            }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        let url = self.table_url("farmer_accounts", &[]);
        let response = self
            .authed(self.http_client.post(&url))
            .header("Prefer", "return=minimal")
            .json(&json!({
                "email": account.email,
                "password_hash": account.password_hash,
                "farmer_id": account.farmer_id,
                "created_at": account.created_at,
            }))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(StoreError::Conflict(account.email.clone()));
        }
        check_status(response).await?;
        Ok(())
    }

    async fn find_account(&self, email: &str) -> StoreResult<Option<Account>> {
        let rows: Vec<AccountRow> = self
            .select("farmer_accounts", &[("select", "*".to_string()), ("email", eq(email))])
            .await?;
        Ok(rows.into_iter().next().map(|row| Account {
            email: row.email,
            password_hash: row.password_hash,
            farmer_id: row.farmer_id,
            created_at: row.created_at,
        }))
    }

    async fn insert_chat_turn(&self, turn: &NewChatTurn) -> StoreResult<ChatTurn> {
        let row: ChatTurnRow = self
            .insert_returning(
                "chat_history",
                json!({
                    "farmer_id": turn.farmer_id,
                    "message": turn.message,
                    "response": turn.response,
                    "language": turn.language,
                }),
            )
            .await?;
        Ok(chat_turn(row))
    }

    async fn list_chat_turns(&self, farmer_id: &str, limit: usize) -> StoreResult<Vec<ChatTurn>> {
        let rows: Vec<ChatTurnRow> = self
            .select(
                "chat_history",
                &[
                    ("select", "*".to_string()),
                    ("farmer_id", eq(farmer_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(chat_turn).collect())
    }

    async fn insert_soil_record(&self, record: &NewSoilRecord) -> StoreResult<SoilRecord> {
        let row: SoilRecordRow = self
            .insert_returning(
                "soil_health_records",
                json!({
                    "farmer_id": record.farmer_id,
                    "ph_level": record.ph_level,
                    "nitrogen_level": record.nitrogen_level,
                    "phosphorus_level": record.phosphorus_level,
                    "potassium_level": record.potassium_level,
                    "organic_matter": record.organic_matter,
                    "recommendations": record.recommendations,
                    "test_date": record.test_date,
                }),
            )
            .await?;
        Ok(soil_record(row))
    }

    async fn list_soil_records(&self, farmer_id: &str) -> StoreResult<Vec<SoilRecord>> {
        let rows: Vec<SoilRecordRow> = self
            .select(
                "soil_health_records",
                &[
                    ("select", "*".to_string()),
                    ("farmer_id", eq(farmer_id)),
                    ("order", "test_date.desc,created_at.desc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(soil_record).collect())
    }

    async fn insert_pest_detection(&self, detection: &NewPestDetection) -> StoreResult<PestDetection> {
        let row: PestDetectionRow = self
            .insert_returning(
                "pest_detections",
                json!({
                    "farmer_id": detection.farmer_id,
                    "crop_type": detection.crop_type,
                    "pest_identified": detection.pest_identified,
                    "confidence_score": detection.confidence_score,
                    "treatment_recommendations": detection.treatment_recommendations,
                    "image_url": detection.image_url,
                }),
            )
            .await?;
        Ok(pest_detection(row))
    }

    async fn list_pest_detections(&self, farmer_id: &str, limit: usize) -> StoreResult<Vec<PestDetection>> {
        let rows: Vec<PestDetectionRow> = self
            .select(
                "pest_detections",
                &[
                    ("select", "*".to_string()),
                    ("farmer_id", eq(farmer_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(pest_detection).collect())
    }

    async fn list_crop_advisories(&self, farmer_id: &str) -> StoreResult<Vec<CropAdvisory>> {
        let rows: Vec<CropAdvisoryRow> = self
            .select(
                "crop_advisories",
                &[
                    ("select", "*".to_string()),
                    ("farmer_id", eq(farmer_id)),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| CropAdvisory {
                id: row.id,
                farmer_id: row.farmer_id,
                crop_type: row.crop_type,
                advisory_text: row.advisory_text,
                advisory_type: row.advisory_type,
                created_at: row.created_at,
            })
            .collect())
    }
}

fn chat_turn(row: ChatTurnRow) -> ChatTurn {
    ChatTurn {
        id: row.id,
        farmer_id: row.farmer_id,
        message: row.message,
        response: row.response,
        language: row.language.unwrap_or_else(default_language),
        created_at: row.created_at,
    }
}

fn soil_record(row: SoilRecordRow) -> SoilRecord {
    SoilRecord {
        id: row.id,
        farmer_id: row.farmer_id,
        ph_level: row.ph_level,
        nitrogen_level: row.nitrogen_level,
        phosphorus_level: row.phosphorus_level,
        potassium_level: row.potassium_level,
        organic_matter: row.organic_matter,
        recommendations: row.recommendations,
        test_date: row.test_date,
        created_at: row.created_at,
    }
}

fn pest_detection(row: PestDetectionRow) -> PestDetection {
    PestDetection {
        id: row.id,
        farmer_id: row.farmer_id,
        crop_type: row.crop_type,
        pest_identified: row.pest_identified,
        confidence_score: row.confidence_score,
        treatment_recommendations: row.treatment_recommendations,
        image_url: row.image_url.unwrap_or_default(),
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SupabaseStore {
        SupabaseStore::new(
            &SupabaseConfig {
                url: "https://demo.supabase.co/".to_string(),
                service_key: "service".to_string(),
            },
            Client::new(),
        )
    }

    #[test]
    fn test_table_url_encodes_filter_values() {
        let url = store().table_url(
            "farmer_accounts",
            &[("select", "*".to_string()), ("email", eq("asha+farm@example.com"))],
        );
        assert_eq!(
            url,
            "https://demo.supabase.co/rest/v1/farmer_accounts?select=*&email=eq.asha%2Bfarm%40example%2Ecom"
        );
    }

    #[test]
    fn test_farmer_row_defaults() {
        let row: FarmerRow = serde_json::from_value(json!({
            "id": "f1",
            "full_name": "Ravi",
            "location": null,
            "farm_size": 2.0,
            "primary_crops": null,
            "language_preference": null,
            "phone_number": null,
            "created_at": "2024-01-15T10:30:00+00:00",
            "updated_at": null
        }))
        .unwrap();
        let farmer = Farmer::from(row);
        assert!(farmer.primary_crops.is_empty());
        assert_eq!(farmer.language_preference, "english");
        assert_eq!(farmer.updated_at, farmer.created_at);
    }
}
