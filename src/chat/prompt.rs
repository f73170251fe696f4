use crate::models::Farmer;

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("../../config/system_prompt.txt");

/// Profile values interpolated into the system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmerContext {
    pub name: String,
    pub location: String,
    pub farm_size: String,
    pub crops: String,
    pub language: String,
}

impl Default for FarmerContext {
    fn default() -> Self {
        Self {
            name: "Farmer".to_string(),
            location: "Unknown".to_string(),
            farm_size: "Unknown".to_string(),
            crops: "Various".to_string(),
            language: "English".to_string(),
        }
    }
}

impl FarmerContext {
    /// Empty or zero fields fall back to the anonymous defaults.
    pub fn from_farmer(farmer: Option<&Farmer>) -> Self {
        let defaults = Self::default();
        let Some(farmer) = farmer else {
            return defaults;
        };

        Self {
            name: non_blank(&farmer.full_name).unwrap_or(defaults.name),
            location: farmer
                .location
                .as_deref()
                .and_then(non_blank)
                .unwrap_or(defaults.location),
            farm_size: farmer
                .farm_size
                .filter(|size| *size != 0.0)
                .map(|size| size.to_string())
                .unwrap_or(defaults.farm_size),
            crops: if farmer.primary_crops.is_empty() {
                defaults.crops
            } else {
                farmer.primary_crops.join(", ")
            },
            language: non_blank(&farmer.language_preference).unwrap_or(defaults.language),
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl FarmerContext {
    fn value(&self, placeholder: &str) -> Option<&str> {
        match placeholder {
            "name" => Some(&self.name),
            "location" => Some(&self.location),
            "farm_size" => Some(&self.farm_size),
            "crops" => Some(&self.crops),
            "language" => Some(&self.language),
            _ => None,
        }
    }
}

/// Fills the template in a single pass, so braces inside profile values stay literal.
pub fn build_system_prompt(context: &FarmerContext) -> String {
    let template = SYSTEM_PROMPT_TEMPLATE.trim_end();
    let mut prompt = String::with_capacity(template.len() + 128);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        prompt.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after
            .find('}')
            .and_then(|close| context.value(&after[..close]).map(|value| (close, value)))
        {
            Some((close, value)) => {
                prompt.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                prompt.push('{');
                rest = after;
            }
        }
    }
    prompt.push_str(rest);
    prompt
}
