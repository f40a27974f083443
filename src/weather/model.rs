//! Weather API response schemas
//!
//! Every field defaults when absent. The provider omits whole sub-objects
//! depending on request flags (`aqi=no`, `alerts=no`), so parsing must never
//! depend on them being present.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub tz_id: String,
    pub localtime_epoch: i64,
    pub localtime: String,
}

impl Location {
    /// `Name, Region, Country` with empty parts left out
    pub fn display_name(&self) -> String {
        [&self.name, &self.region, &self.country]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub text: String,
    pub icon: String,
    pub code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirQuality {
    pub co: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm2_5: f64,
    pub pm10: f64,
    #[serde(rename = "us-epa-index")]
    pub us_epa_index: i64,
    #[serde(rename = "gb-defra-index")]
    pub gb_defra_index: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Current {
    pub last_updated_epoch: i64,
    pub last_updated: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub is_day: i64,
    pub condition: Condition,
    pub wind_kph: f64,
    pub wind_mph: f64,
    pub wind_dir: String,
    pub pressure_mb: f64,
    pub precip_mm: f64,
    pub humidity: i64,
    pub cloud: i64,
    pub feelslike_c: f64,
    pub feelslike_f: f64,
    pub vis_km: f64,
    pub uv: f64,
    pub air_quality: AirQuality,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Astro {
    pub sunrise: String,
    pub sunset: String,
    pub moonrise: String,
    pub moonset: String,
    pub moon_phase: String,
    pub moon_illumination: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Day {
    pub maxtemp_c: f64,
    pub mintemp_c: f64,
    pub avgtemp_c: f64,
    pub maxwind_kph: f64,
    pub totalprecip_mm: f64,
    pub avghumidity: f64,
    pub daily_chance_of_rain: i64,
    pub daily_chance_of_snow: i64,
    pub condition: Condition,
    pub uv: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hour {
    pub time_epoch: i64,
    pub time: String,
    pub temp_c: f64,
    pub condition: Condition,
    pub chance_of_rain: i64,
    pub wind_kph: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastDay {
    pub date: String,
    pub date_epoch: i64,
    pub day: Day,
    pub astro: Astro,
    pub hour: Vec<Hour>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Forecast {
    pub forecastday: Vec<ForecastDay>,
}

/// `current.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentResponse {
    pub location: Location,
    pub current: Current,
}

/// `forecast.json`, `history.json` and `future.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastResponse {
    pub location: Location,
    pub current: Option<Current>,
    pub forecast: Forecast,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Astronomy {
    pub astro: Astro,
}

/// `astronomy.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AstronomyResponse {
    pub location: Location,
    pub astronomy: Astronomy,
}

/// Provider error body, `{"error": {"code": 1006, "message": "..."}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorResponse {
    pub error: ApiError,
}

/// Condensed current conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSummary {
    pub location: String,
    pub local_time: String,
    pub temp_c: f64,
    pub feels_like_c: f64,
    pub condition: String,
    pub humidity: i64,
    pub wind_kph: f64,
    pub wind_dir: String,
    /// US EPA index (1 good .. 6 hazardous); absent when the provider sent no air quality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_quality_index: Option<i64>,
}

impl From<&CurrentResponse> for CurrentSummary {
    fn from(response: &CurrentResponse) -> Self {
        let current = &response.current;
        let index = current.air_quality.us_epa_index;
        Self {
            location: response.location.display_name(),
            local_time: response.location.localtime.clone(),
            temp_c: current.temp_c,
            feels_like_c: current.feelslike_c,
            condition: current.condition.text.clone(),
            humidity: current.humidity,
            wind_kph: current.wind_kph,
            wind_dir: current.wind_dir.clone(),
            air_quality_index: (index > 0).then_some(index),
        }
    }
}

/// One day of a condensed forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: String,
    pub condition: String,
    pub min_c: f64,
    pub max_c: f64,
    pub chance_of_rain: i64,
    pub sunrise: String,
    pub sunset: String,
}

impl From<&ForecastDay> for DaySummary {
    fn from(day: &ForecastDay) -> Self {
        Self {
            date: day.date.clone(),
            condition: day.day.condition.text.clone(),
            min_c: day.day.mintemp_c,
            max_c: day.day.maxtemp_c,
            chance_of_rain: day.day.daily_chance_of_rain,
            sunrise: day.astro.sunrise.clone(),
            sunset: day.astro.sunset.clone(),
        }
    }
}

/// Condensed multi-day forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSummary {
    pub location: String,
    pub days: Vec<DaySummary>,
}

impl From<&ForecastResponse> for ForecastSummary {
    fn from(response: &ForecastResponse) -> Self {
        Self {
            location: response.location.display_name(),
            days: response
                .forecast
                .forecastday
                .iter()
                .map(DaySummary::from)
                .collect(),
        }
    }
}
