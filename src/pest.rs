//! Image-based pest and disease diagnosis.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::{ContentPart, ImageUrl, ProviderMessage, StructuredRequest, UserContent};
use crate::models::NewPestDetection;
use crate::tools::Severity;

pub const SCHEMA_NAME: &str = "pest_analysis";
pub const PLACEHOLDER_IMAGE_URL: &str = "/placeholder.svg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treatment {
    pub immediate: Vec<String>,
    pub long_term: Vec<String>,
    pub organic: Vec<String>,
    pub chemical: Vec<String>,
}

/// Diagnosis returned by the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PestAnalysis {
    pub pest_identified: String,
    /// Percent, 0 to 100.
    pub confidence: f64,
    pub severity: Severity,
    pub description: String,
    pub symptoms: Vec<String>,
    pub treatment: Treatment,
    pub prevention: Vec<String>,
    pub economic_impact: String,
}

impl PestAnalysis {
    /// Decodes and range-checks a provider reply.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let analysis: PestAnalysis =
            serde_json::from_value(value).map_err(|e| format!("analysis does not match schema: {}", e))?;
        if !(0.0..=100.0).contains(&analysis.confidence) {
            return Err(format!("confidence {} is outside 0-100", analysis.confidence));
        }
        if analysis.pest_identified.trim().is_empty() {
            return Err("pestIdentified is empty".to_string());
        }
        Ok(analysis)
    }

    pub fn to_detection(&self, farmer_id: &str, crop_type: &str) -> NewPestDetection {
        NewPestDetection {
            farmer_id: farmer_id.to_string(),
            crop_type: crop_type.to_string(),
            pest_identified: self.pest_identified.clone(),
            confidence_score: self.confidence / 100.0,
            treatment_recommendations: self.treatment.immediate.join(", "),
            image_url: PLACEHOLDER_IMAGE_URL.to_string(),
        }
    }
}

/// JSON schema sent as the strict response format.
pub fn analysis_schema() -> Value {
    let strings = |description: &str| json!({ "type": "array", "items": { "type": "string" }, "description": description });
    json!({
        "type": "object",
        "properties": {
            "pestIdentified": { "type": "string", "description": "Name of the identified pest or disease" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 100, "description": "Confidence level in percentage" },
            "severity": { "type": "string", "enum": ["low", "medium", "high"], "description": "Severity of the infestation" },
            "description": { "type": "string", "description": "Detailed description of the pest/disease" },
            "symptoms": strings("List of visible symptoms"),
            "treatment": {
                "type": "object",
                "properties": {
                    "immediate": strings("Immediate treatment steps"),
                    "longTerm": strings("Long-term management strategies"),
                    "organic": strings("Organic treatment options"),
                    "chemical": strings("Chemical treatment options if needed")
                },
                "required": ["immediate", "longTerm", "organic", "chemical"],
                "additionalProperties": false
            },
            "prevention": strings("Prevention measures for future"),
            "economicImpact": { "type": "string", "description": "Potential economic impact if untreated" }
        },
        "required": [
            "pestIdentified", "confidence", "severity", "description",
            "symptoms", "treatment", "prevention", "economicImpact"
        ],
        "additionalProperties": false
    })
}

pub fn analysis_prompt(crop_type: &str, symptoms: &str) -> String {
    format!(
        "Analyze this image of a {} plant showing these symptoms: {}.\n\
         Identify any pests, diseases, or nutrient deficiencies visible in the image.\n\
         Provide detailed treatment recommendations suitable for small-scale farmers.\n\
         Consider both organic and chemical treatment options.",
        crop_type, symptoms
    )
}

/// `data:` URL for the uploaded bytes. Unknown types are sent as JPEG.
pub fn image_data_url(bytes: &[u8], content_type: Option<&str>) -> String {
    let mime = content_type
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or("image/jpeg");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn analysis_request(
    crop_type: &str,
    symptoms: &str,
    image: &[u8],
    content_type: Option<&str>,
) -> StructuredRequest {
    StructuredRequest {
        messages: vec![ProviderMessage::User {
            content: UserContent::Parts(vec![
                ContentPart::Text {
                    text: analysis_prompt(crop_type, symptoms),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url(image, content_type),
                    },
                },
            ]),
        }],
        schema_name: SCHEMA_NAME.to_string(),
        schema: analysis_schema(),
        temperature: 0.2,
    }
}
