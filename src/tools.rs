//! Advisory tools the chat model may call.
//!
//! Arguments arrive as JSON text from the model and are validated by
//! deserialising into [`ToolCall`]. Every tool is pure and deterministic.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CROP_ADVISORY: &str = "getCropAdvisory";
pub const SOIL_HEALTH: &str = "getSoilHealth";
pub const PEST_CONTROL: &str = "getPestControl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropAdvisoryArgs {
    pub crop_type: String,
    pub location: String,
    pub issue: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilHealthArgs {
    pub soil_type: String,
    pub crop_type: String,
    pub symptoms: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PestControlArgs {
    pub pest_description: String,
    pub crop_type: String,
    pub severity: Severity,
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments")]
pub enum ToolCall {
    #[serde(rename = "getCropAdvisory")]
    CropAdvisory(CropAdvisoryArgs),
    #[serde(rename = "getSoilHealth")]
    SoilHealth(SoilHealthArgs),
    #[serde(rename = "getPestControl")]
    PestControl(PestControlArgs),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropAdvisoryOutput {
    pub crop_type: String,
    pub location: String,
    pub advisory: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilHealthOutput {
    pub analysis: String,
    pub recommendations: Vec<String>,
    pub next_steps: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PestControlOutput {
    pub likely_pest: String,
    pub treatment_options: Vec<String>,
    pub prevention_tips: Vec<String>,
    pub urgency: String,
}

impl ToolCall {
    /// Validates a call by tool name and the raw JSON argument text.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, String> {
        let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
        let args: Value = serde_json::from_str(arguments)
            .map_err(|e| format!("arguments for {} are not valid JSON: {}", name, e))?;

        match name {
            CROP_ADVISORY | SOIL_HEALTH | PEST_CONTROL => {}
            other => return Err(format!("unknown tool '{}'", other)),
        }

        serde_json::from_value(json!({ "name": name, "arguments": args }))
            .map_err(|e| format!("invalid arguments for {}: {}", name, e))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::CropAdvisory(_) => CROP_ADVISORY,
            ToolCall::SoilHealth(_) => SOIL_HEALTH,
            ToolCall::PestControl(_) => PEST_CONTROL,
        }
    }

    pub fn execute(&self) -> Value {
        let output = match self {
            ToolCall::CropAdvisory(args) => serde_json::to_value(crop_advisory(args)),
            ToolCall::SoilHealth(args) => serde_json::to_value(soil_health(args)),
            ToolCall::PestControl(args) => serde_json::to_value(pest_control(args)),
        };
        output.unwrap_or_else(|e| tool_error(&e.to_string()))
    }
}

/// Output reported back for a call that could not be validated.
pub fn tool_error(message: &str) -> Value {
    json!({ "error": message })
}

pub fn crop_advisory(args: &CropAdvisoryArgs) -> CropAdvisoryOutput {
    CropAdvisoryOutput {
        crop_type: args.crop_type.clone(),
        location: args.location.clone(),
        advisory: format!(
            "For {} in {}: Based on current conditions, here's specific advice for {}. \
             Consider soil moisture levels, weather patterns, and seasonal timing.",
            args.crop_type, args.location, args.issue
        ),
        recommendations: crop_recommendations(&args.crop_type)
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

fn crop_recommendations(crop_type: &str) -> &'static [&'static str] {
    match crop_type.trim().to_ascii_lowercase().as_str() {
        "wheat" => &[
            "Irrigate at crown root initiation, about 21 days after sowing",
            "Split nitrogen application between sowing and first irrigation",
            "Watch for yellow rust during cool, humid spells",
        ],
        "rice" | "paddy" => &[
            "Maintain 2-5 cm standing water during tillering",
            "Apply zinc sulphate where leaves show khaira symptoms",
            "Drain fields 10-15 days before harvest",
        ],
        "maize" | "corn" => &[
            "Keep soil moist at tasseling and silking",
            "Side-dress nitrogen at knee-high stage",
            "Scout whorls for fall armyworm weekly",
        ],
        "cotton" => &[
            "Avoid water stress during flowering and boll formation",
            "Use pheromone traps to monitor pink bollworm",
            "Remove and destroy crop residue after final picking",
        ],
        "sugarcane" => &[
            "Earth up the crop before the monsoon to prevent lodging",
            "Apply trash mulching to conserve moisture",
            "Irrigate at 7-10 day intervals in the summer months",
        ],
        "tomato" => &[
            "Stake plants to keep fruit off the soil",
            "Water at the base to limit leaf diseases",
            "Rotate away from solanaceous crops for two seasons",
        ],
        "soybean" | "soybeans" => &[
            "Treat seed with Rhizobium culture before sowing",
            "Ensure drainage; soybean does not tolerate waterlogging",
            "Monitor for girdle beetle and stem fly",
        ],
        _ => &[
            "Monitor soil moisture regularly",
            "Apply appropriate fertilizer based on soil test",
            "Watch for common pests in your region",
        ],
    }
}

pub fn soil_health(args: &SoilHealthArgs) -> SoilHealthOutput {
    SoilHealthOutput {
        analysis: format!(
            "For {} soil growing {}: {}",
            args.soil_type, args.crop_type, args.symptoms
        ),
        recommendations: vec![
            "Test soil pH levels".to_string(),
            "Check nutrient balance (N-P-K)".to_string(),
            "Consider organic matter content".to_string(),
            "Evaluate drainage conditions".to_string(),
        ],
        next_steps: "Schedule a comprehensive soil test for detailed analysis".to_string(),
    }
}

pub fn pest_control(args: &PestControlArgs) -> PestControlOutput {
    let urgency = match args.severity {
        Severity::High => "Immediate action required",
        Severity::Low | Severity::Medium => "Monitor and treat as needed",
    };
    PestControlOutput {
        likely_pest: format!(
            "Based on description: {} on {}",
            args.pest_description, args.crop_type
        ),
        treatment_options: vec![
            "Organic treatment options".to_string(),
            "Chemical control methods".to_string(),
            "Integrated pest management approach".to_string(),
        ],
        prevention_tips: vec![
            "Regular crop monitoring".to_string(),
            "Maintain field hygiene".to_string(),
            "Use resistant varieties when available".to_string(),
        ],
        urgency: urgency.to_string(),
    }
}

/// Tool descriptors in OpenAI-compatible `tools` format.
pub fn descriptors() -> Vec<Value> {
    vec![
        function_descriptor(
            CROP_ADVISORY,
            "Get specific crop advisory information based on crop type, location, and current conditions",
            json!({
                "cropType": { "type": "string", "description": "Type of crop (e.g., wheat, corn, rice)" },
                "location": { "type": "string", "description": "Farmer location" },
                "issue": { "type": "string", "description": "Specific farming issue or question" }
            }),
            &["cropType", "location", "issue"],
        ),
        function_descriptor(
            SOIL_HEALTH,
            "Provide soil health recommendations and analysis",
            json!({
                "soilType": { "type": "string", "description": "Type of soil" },
                "cropType": { "type": "string", "description": "Crop being grown" },
                "symptoms": { "type": "string", "description": "Any visible symptoms or concerns" }
            }),
            &["soilType", "cropType", "symptoms"],
        ),
        function_descriptor(
            PEST_CONTROL,
            "Identify pests and provide treatment recommendations",
            json!({
                "pestDescription": { "type": "string", "description": "Description of the pest or damage observed" },
                "cropType": { "type": "string", "description": "Affected crop" },
                "severity": { "type": "string", "enum": ["low", "medium", "high"], "description": "Severity of infestation" }
            }),
            &["pestDescription", "cropType", "severity"],
        ),
    ]
}

fn function_descriptor(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pest_control() {
        let call = ToolCall::parse(
            PEST_CONTROL,
            r#"{"pestDescription":"white flies under leaves","cropType":"cotton","severity":"high"}"#,
        )
        .unwrap();
        let out = call.execute();
        assert_eq!(out["urgency"], "Immediate action required");
        assert_eq!(out["likelyPest"], "Based on description: white flies under leaves on cotton");
        assert_eq!(out["preventionTips"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_medium_severity_is_monitor() {
        let call = ToolCall::parse(
            PEST_CONTROL,
            r#"{"pestDescription":"holes","cropType":"maize","severity":"medium"}"#,
        )
        .unwrap();
        assert_eq!(call.execute()["urgency"], "Monitor and treat as needed");
    }

    #[test]
    fn test_crop_advisory_uses_crop_table() {
        let call = ToolCall::parse(
            CROP_ADVISORY,
            r#"{"cropType":"Wheat","location":"Punjab","issue":"yellowing leaves"}"#,
        )
        .unwrap();
        let out = call.execute();
        assert!(out["advisory"]
            .as_str()
            .unwrap()
            .starts_with("For Wheat in Punjab: Based on current conditions"));
        assert_eq!(
            out["recommendations"][0],
            "Irrigate at crown root initiation, about 21 days after sowing"
        );

        let unknown = crop_advisory(&CropAdvisoryArgs {
            crop_type: "quinoa".to_string(),
            location: "Leh".to_string(),
            issue: "frost".to_string(),
        });
        assert_eq!(unknown.recommendations[0], "Monitor soil moisture regularly");
    }

    #[test]
    fn test_soil_health_output() {
        let call = ToolCall::parse(
            SOIL_HEALTH,
            r#"{"soilType":"clay","cropType":"rice","symptoms":"waterlogging"}"#,
        )
        .unwrap();
        assert_eq!(call.name(), SOIL_HEALTH);
        let out = call.execute();
        assert_eq!(out["analysis"], "For clay soil growing rice: waterlogging");
        assert_eq!(out["nextSteps"], "Schedule a comprehensive soil test for detailed analysis");
    }

    #[test]
    fn test_rejects_unknown_tool_and_bad_args() {
        assert!(ToolCall::parse("getWeather", "{}").unwrap_err().contains("unknown tool"));
        assert!(ToolCall::parse(PEST_CONTROL, r#"{"pestDescription":"x","cropType":"y","severity":"extreme"}"#).is_err());
        assert!(ToolCall::parse(SOIL_HEALTH, "{not json").is_err());
        assert!(ToolCall::parse(CROP_ADVISORY, "").is_err());
    }

    #[test]
    fn test_descriptors_shape() {
        let tools = descriptors();
        assert_eq!(tools.len(), 3);
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec![CROP_ADVISORY, SOIL_HEALTH, PEST_CONTROL]);
        assert_eq!(tools[2]["function"]["parameters"]["required"][2], "severity");
    }
}
