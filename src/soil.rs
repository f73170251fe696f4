use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::{NewSoilRecord, NutrientLevel};

const OPTIMAL: &str = "Soil levels are within optimal range";

/// Body of `POST /api/soil-records`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilRecordInput {
    pub ph_level: f64,
    pub nitrogen_level: NutrientLevel,
    pub phosphorus_level: NutrientLevel,
    pub potassium_level: NutrientLevel,
    pub organic_matter: f64,
    #[serde(default)]
    pub test_date: Option<NaiveDate>,
}

impl SoilRecordInput {
    pub fn into_record(self, farmer_id: &str) -> Result<NewSoilRecord, ApiError> {
        if !(0.0..=14.0).contains(&self.ph_level) {
            return Err(ApiError::Validation("pH level must be between 0 and 14".to_string()));
        }
        if !(0.0..=100.0).contains(&self.organic_matter) {
            return Err(ApiError::Validation(
                "Organic matter must be between 0 and 100 percent".to_string(),
            ));
        }

        let recommendations = recommendations(
            self.ph_level,
            self.nitrogen_level,
            self.phosphorus_level,
            self.potassium_level,
            self.organic_matter,
        );

        Ok(NewSoilRecord {
            farmer_id: farmer_id.to_string(),
            ph_level: self.ph_level,
            nitrogen_level: self.nitrogen_level,
            phosphorus_level: self.phosphorus_level,
            potassium_level: self.potassium_level,
            organic_matter: self.organic_matter,
            recommendations,
            test_date: self.test_date.unwrap_or_else(|| Utc::now().date_naive()),
        })
    }
}

pub fn recommendations(
    ph: f64,
    nitrogen: NutrientLevel,
    phosphorus: NutrientLevel,
    potassium: NutrientLevel,
    organic_matter: f64,
) -> String {
    let mut advice = Vec::new();

    if ph < 6.0 {
        advice.push("Apply lime to raise soil pH");
    } else if ph > 7.5 {
        advice.push("Apply sulfur to lower soil pH");
    }
    if nitrogen == NutrientLevel::Low {
        advice.push("Apply nitrogen-rich fertilizer");
    }
    if phosphorus == NutrientLevel::Low {
        advice.push("Add phosphorus fertilizer");
    }
    if potassium == NutrientLevel::Low {
        advice.push("Apply potassium fertilizer");
    }
    if organic_matter < 3.0 {
        advice.push("Increase organic matter with compost");
    }

    if advice.is_empty() {
        OPTIMAL.to_string()
    } else {
        advice.join(". ")
    }
}
