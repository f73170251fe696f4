use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LANGUAGE: &str = "english";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farmer {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub farm_size: Option<f64>,
    #[serde(default)]
    pub primary_crops: Vec<String>,
    #[serde(default = "default_language")]
    pub language_preference: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Farmer {
    pub fn new(id: impl Into<String>, full_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            full_name: full_name.into(),
            location: None,
            farm_size: None,
            primary_crops: Vec::new(),
            language_preference: default_language(),
            phone_number: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Parses a crop list given either as a JSON array or a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CropList {
    List(Vec<String>),
    Csv(String),
}

impl CropList {
    pub fn into_vec(self) -> Vec<String> {
        let raw = match self {
            CropList::List(items) => items,
            CropList::Csv(s) => s.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub id: String,
    pub farmer_id: String,
    pub message: String,
    pub response: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChatTurn {
    pub farmer_id: String,
    pub message: String,
    pub response: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NutrientLevel {
    Low,
    Medium,
    High,
}

impl NutrientLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NutrientLevel::Low => "low",
            NutrientLevel::Medium => "medium",
            NutrientLevel::High => "high",
        }
    }
}

impl fmt::Display for NutrientLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NutrientLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(NutrientLevel::Low),
            "medium" => Ok(NutrientLevel::Medium),
            "high" => Ok(NutrientLevel::High),
            other => Err(format!("unknown nutrient level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilRecord {
    pub id: String,
    pub farmer_id: String,
    pub ph_level: f64,
    pub nitrogen_level: NutrientLevel,
    pub phosphorus_level: NutrientLevel,
    pub potassium_level: NutrientLevel,
    pub organic_matter: f64,
    pub recommendations: String,
    pub test_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSoilRecord {
    pub farmer_id: String,
    pub ph_level: f64,
    pub nitrogen_level: NutrientLevel,
    pub phosphorus_level: NutrientLevel,
    pub potassium_level: NutrientLevel,
    pub organic_matter: f64,
    pub recommendations: String,
    pub test_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PestDetection {
    pub id: String,
    pub farmer_id: String,
    pub crop_type: String,
    pub pest_identified: String,
    /// Fraction in 0.0..=1.0.
    pub confidence_score: f64,
    pub treatment_recommendations: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPestDetection {
    pub farmer_id: String,
    pub crop_type: String,
    pub pest_identified: String,
    pub confidence_score: f64,
    pub treatment_recommendations: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropAdvisory {
    pub id: String,
    pub farmer_id: String,
    pub crop_type: String,
    pub advisory_text: String,
    pub advisory_type: String,
    pub created_at: DateTime<Utc>,
}

/// Login identity; the hash never leaves the store layer except for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub email: String,
    pub password_hash: String,
    pub farmer_id: String,
    pub created_at: DateTime<Utc>,
}
