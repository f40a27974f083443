//! Request policy
//!
//! Path allow-list and query validation. Both run before any signature or
//! rate-limit work so malformed requests are rejected cheaply.

use crate::constants::{MAX_FORECAST_DAYS, MAX_QUERY_LEN, MIN_FORECAST_DAYS};
use crate::{GatewayError, Result};
use std::fmt;
use std::str::FromStr;

/// Upstream endpoints the proxy forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Current,
    Forecast,
    Astronomy,
    History,
    Future,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Current,
        Endpoint::Forecast,
        Endpoint::Astronomy,
        Endpoint::History,
        Endpoint::Future,
    ];

    /// Path segment of the endpoint, e.g. `current.json`
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Current => "current.json",
            Endpoint::Forecast => "forecast.json",
            Endpoint::Astronomy => "astronomy.json",
            Endpoint::History => "history.json",
            Endpoint::Future => "future.json",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| GatewayError::validation("Endpoint not allowed"))
    }
}

/// Resolve a request path under `prefix` to an allowed endpoint
///
/// The path must be exactly `prefix + "/" + endpoint`; nested segments,
/// traversal attempts and unknown endpoints are rejected.
pub fn authorize_path(path: &str, prefix: &str) -> Result<Endpoint> {
    let rest = path
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| GatewayError::validation("Endpoint not allowed"))?;

    rest.parse()
}

/// Validate caller query parameters for `endpoint`
///
/// Every occurrence of a repeated parameter is checked, since all of them
/// are forwarded.
pub fn validate_query(endpoint: Endpoint, params: &[(String, String)]) -> Result<()> {
    for (name, value) in params {
        match name.as_str() {
            "q" if value.chars().count() > MAX_QUERY_LEN => {
                return Err(GatewayError::validation("Query too long"));
            }
            "days" if endpoint == Endpoint::Forecast => {
                let days: i64 = value
                    .trim()
                    .parse()
                    .map_err(|_| GatewayError::validation("Invalid days parameter"))?;
                if !(MIN_FORECAST_DAYS..=MAX_FORECAST_DAYS).contains(&days) {
                    return Err(GatewayError::validation("Invalid days parameter"));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_authorize_path_allows_listed_endpoints() {
        for endpoint in Endpoint::ALL {
            let path = format!("/weatherapi/{}", endpoint);
            assert_eq!(authorize_path(&path, "/weatherapi").unwrap(), endpoint);
        }
    }

    #[test]
    fn test_authorize_path_rejects_everything_else() {
        for path in [
            "/weatherapi/search.json",
            "/weatherapi/",
            "/weatherapi",
            "/weatherapicurrent.json",
            "/other/current.json",
            "/weatherapi/v1/current.json",
            "/weatherapi/../current.json",
            "/weatherapi/current.json/",
        ] {
            assert!(
                matches!(
                    authorize_path(path, "/weatherapi"),
                    Err(GatewayError::Validation(_))
                ),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(
            authorize_path("/wx/forecast.json", "/wx").unwrap(),
            Endpoint::Forecast
        );
        assert!(authorize_path("/weatherapi/forecast.json", "/wx").is_err());
    }

    #[test]
    fn test_query_length_limit() {
        let ok = "a".repeat(120);
        let too_long = "a".repeat(121);
        assert!(validate_query(Endpoint::Current, &params(&[("q", &ok)])).is_ok());
        assert!(validate_query(Endpoint::Current, &params(&[("q", &too_long)])).is_err());

        // Characters, not bytes
        let accented = "é".repeat(120);
        assert!(validate_query(Endpoint::Current, &params(&[("q", &accented)])).is_ok());
    }

    #[test]
    fn test_forecast_days_bounds() {
        for days in ["1", "10", "5"] {
            assert!(validate_query(Endpoint::Forecast, &params(&[("days", days)])).is_ok());
        }
        for days in ["0", "11", "15", "-1", "3.5", "many", ""] {
            assert!(
                validate_query(Endpoint::Forecast, &params(&[("days", days)])).is_err(),
                "days={} should be rejected",
                days
            );
        }
    }

    #[test]
    fn test_days_ignored_outside_forecast() {
        assert!(validate_query(Endpoint::Current, &params(&[("days", "99")])).is_ok());
        assert!(validate_query(Endpoint::Forecast, &params(&[("q", "Denver")])).is_ok());
    }

    #[test]
    fn test_repeated_parameters_all_checked() {
        let long = "a".repeat(121);
        assert!(
            validate_query(Endpoint::Current, &params(&[("q", "Oslo"), ("q", &long)])).is_err()
        );
        assert!(
            validate_query(Endpoint::Forecast, &params(&[("days", "3"), ("days", "30")])).is_err()
        );
    }
}
