use axum::{extract::Query, routing::get, Json, Router};
use serde::Deserialize;

use crate::mock_data::{self, MarketReport, WeatherReport};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/weather", get(weather))
        .route("/api/market-prices", get(market_prices))
}

#[derive(Debug, Default, Deserialize)]
struct LocationQuery {
    location: Option<String>,
}

async fn weather(Query(query): Query<LocationQuery>) -> Json<WeatherReport> {
    let location = mock_data::location_or(query.location.as_deref(), mock_data::DEFAULT_WEATHER_LOCATION);
    Json(mock_data::weather(&location))
}

async fn market_prices(Query(query): Query<LocationQuery>) -> Json<MarketReport> {
    let location = mock_data::location_or(query.location.as_deref(), mock_data::DEFAULT_MARKET_LOCATION);
    Json(mock_data::market_prices(&location))
}
