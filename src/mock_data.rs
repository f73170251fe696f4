//! Fixed weather, market and seasonal data served until live feeds exist.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_WEATHER_LOCATION: &str = "New Delhi";
pub const DEFAULT_MARKET_LOCATION: &str = "Delhi";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeather {
    pub temperature: i32,
    pub condition: &'static str,
    pub humidity: u32,
    pub wind_speed: u32,
    pub uv_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    pub date: &'static str,
    pub high: i32,
    pub low: i32,
    pub condition: &'static str,
    pub precipitation: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherAlert {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub location: String,
    pub current: CurrentWeather,
    pub forecast: Vec<ForecastDay>,
    pub alerts: Vec<WeatherAlert>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropPrice {
    pub crop: &'static str,
    pub variety: &'static str,
    pub price: u32,
    pub unit: &'static str,
    pub change: i32,
    pub change_percent: f64,
    pub market: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTrends {
    pub rising: Vec<&'static str>,
    pub falling: Vec<&'static str>,
    pub stable: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketReport {
    pub location: String,
    pub last_updated: DateTime<Utc>,
    pub prices: Vec<CropPrice>,
    pub trends: PriceTrends,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalAdvisory {
    pub id: &'static str,
    pub crop_type: &'static str,
    pub advisory_type: &'static str,
    pub advisory_text: &'static str,
    pub priority: &'static str,
    pub valid_until: &'static str,
}

/// Falls back to `default` when the query is absent or blank.
pub fn location_or(query: Option<&str>, default: &str) -> String {
    query
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(default)
        .to_string()
}

pub fn current_weather() -> CurrentWeather {
    CurrentWeather {
        temperature: 28,
        condition: "Partly Cloudy",
        humidity: 65,
        wind_speed: 12,
        uv_index: 6,
    }
}

pub fn weather(location: &str) -> WeatherReport {
    let day = |date, high, low, condition, precipitation| ForecastDay {
        date,
        high,
        low,
        condition,
        precipitation,
    };

    WeatherReport {
        location: location.to_string(),
        current: current_weather(),
        forecast: vec![
            day("2024-01-15", 30, 18, "Sunny", 0),
            day("2024-01-16", 32, 20, "Partly Cloudy", 10),
            day("2024-01-17", 29, 17, "Light Rain", 70),
            day("2024-01-18", 27, 16, "Cloudy", 30),
            day("2024-01-19", 31, 19, "Sunny", 0),
        ],
        alerts: vec![WeatherAlert {
            kind: "warning",
            title: "Heavy Rain Expected",
            description: "Heavy rainfall expected tomorrow. Consider postponing field activities.",
        }],
    }
}

pub fn crop_prices() -> Vec<CropPrice> {
    let price = |crop, variety, price, change, change_percent, market| CropPrice {
        crop,
        variety,
        price,
        unit: "per quintal",
        change,
        change_percent,
        market,
    };

    vec![
        price("Wheat", "HD-2967", 2150, 50, 2.4, "APMC Azadpur"),
        price("Rice", "Basmati", 4200, -100, -2.3, "APMC Azadpur"),
        price("Sugarcane", "Co-238", 350, 15, 4.5, "Local Market"),
        price("Cotton", "Bt Cotton", 5800, 200, 3.6, "Cotton Market"),
        price("Maize", "Hybrid", 1850, -25, -1.3, "APMC Azadpur"),
    ]
}

pub fn market_prices(location: &str) -> MarketReport {
    MarketReport {
        location: location.to_string(),
        last_updated: Utc::now(),
        prices: crop_prices(),
        trends: PriceTrends {
            rising: vec!["Wheat", "Sugarcane", "Cotton"],
            falling: vec!["Rice", "Maize"],
            stable: Vec::new(),
        },
    }
}

pub fn seasonal_advisories() -> Vec<SeasonalAdvisory> {
    vec![
        SeasonalAdvisory {
            id: "current-1",
            crop_type: "Wheat",
            advisory_type: "planting",
            advisory_text: "Spring wheat planting season is approaching. Prepare your fields by testing soil \
                            moisture and temperature. Optimal planting occurs when soil temperature reaches \
                            40°F consistently.",
            priority: "high",
            valid_until: "Next 2 weeks",
        },
        SeasonalAdvisory {
            id: "current-2",
            crop_type: "Corn",
            advisory_type: "planting",
            advisory_text: "Begin preparing corn fields for planting. Apply pre-emergent herbicides if needed. \
                            Monitor weather forecasts for optimal planting windows.",
            priority: "medium",
            valid_until: "Next 3 weeks",
        },
        SeasonalAdvisory {
            id: "current-3",
            crop_type: "Soybeans",
            advisory_type: "planting",
            advisory_text: "Consider nitrogen fixation benefits when planning soybean rotation. Soil temperature \
                            should reach 50°F for optimal germination.",
            priority: "low",
            valid_until: "Next month",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_weather_shape() {
        let value = serde_json::to_value(weather("Nashik")).unwrap();
        assert_eq!(value["location"], "Nashik");
        assert_eq!(value["current"]["windSpeed"], 12);
        assert_eq!(value["current"]["uvIndex"], 6);
        assert_eq!(value["forecast"].as_array().unwrap().len(), 5);
        assert_eq!(value["forecast"][2]["condition"], "Light Rain");
        assert_eq!(value["alerts"][0]["type"], "warning");
    }

    #[test]
    fn test_market_prices_only_timestamp_varies() {
        let mut a = serde_json::to_value(market_prices("Delhi")).unwrap();
        let mut b = serde_json::to_value(market_prices("Delhi")).unwrap();
        a["lastUpdated"] = json!(null);
        b["lastUpdated"] = json!(null);
        assert_eq!(a, b);
        assert_eq!(a["prices"][1]["changePercent"], -2.3);
        assert_eq!(a["trends"]["stable"], json!([]));
    }

    #[test]
    fn test_location_defaults() {
        assert_eq!(location_or(None, DEFAULT_WEATHER_LOCATION), "New Delhi");
        assert_eq!(location_or(Some("  "), DEFAULT_MARKET_LOCATION), "Delhi");
        assert_eq!(location_or(Some("Pune"), DEFAULT_MARKET_LOCATION), "Pune");
    }

    #[test]
    fn test_seasonal_advisories_fixed() {
        let advisories = seasonal_advisories();
        let crops: Vec<_> = advisories.iter().map(|a| a.crop_type).collect();
        assert_eq!(crops, vec!["Wheat", "Corn", "Soybeans"]);
        assert!(advisories[0].advisory_text.ends_with("reaches 40°F consistently."));
    }
}
