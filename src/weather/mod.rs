//! Weather API schemas and a typed gateway client

pub mod client;
pub mod model;

pub use client::WeatherClient;
pub use model::{
    AstronomyResponse, CurrentResponse, CurrentSummary, ForecastResponse, ForecastSummary,
};

#[cfg(test)]
mod weather_test;
