//! Command-line interface for the weather gateway
//!
//! - `serve`: run the gateway
//! - `serve-counters`: run the coordinated counter service
//! - `sign`: print signed request headers for a path
//! - `weather`: query the gateway with the typed client

use crate::auth::RequestSigner;
use crate::config::Config;
use crate::constants::{CONFIG_FILE_NAME, DEFAULT_UPSTREAM_TIMEOUT_MS};
use crate::weather::WeatherClient;
use crate::{GatewayError, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Map, Value};

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(CONFIG_FILE_NAME);

    match matches.subcommand() {
        Some(("serve", sub_matches)) => handle_serve_command(config_path, sub_matches).await,
        Some(("serve-counters", sub_matches)) => {
            handle_serve_counters_command(config_path, sub_matches).await
        }
        Some(("sign", sub_matches)) => handle_sign_command(config_path, sub_matches),
        Some(("weather", sub_matches)) => handle_weather_command(config_path, sub_matches).await,
        _ => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Build the command tree
pub fn build_cli() -> Command {
    Command::new("gateway")
        .about("Weather Gateway - authenticated, signed and rate-limited weather API proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .env("GATEWAY_CONFIG")
                .help("Path to the JSON or YAML configuration file"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the gateway HTTP server")
                .arg(Arg::new("host").long("host").help("Host to bind to"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(clap::value_parser!(u16))
                        .help("Port to bind to"),
                ),
        )
        .subcommand(
            Command::new("serve-counters")
                .about("Start the coordinated counter service")
                .arg(Arg::new("host").long("host").help("Host to bind to"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(clap::value_parser!(u16))
                        .help("Port to bind to"),
                )
                .arg(
                    Arg::new("dsn")
                        .long("dsn")
                        .help("SQLite DSN for counters (e.g. sqlite:counters.db)"),
                ),
        )
        .subcommand(
            Command::new("sign")
                .about("Print signed request headers for a path and query")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .help("Path and query as sent, e.g. /weatherapi/current.json?q=Denver"),
                )
                .arg(
                    Arg::new("method")
                        .long("method")
                        .short('X')
                        .default_value("GET")
                        .help("HTTP method"),
                )
                .arg(
                    Arg::new("client-id")
                        .long("client-id")
                        .help("Client identity to sign as"),
                )
                .arg(
                    Arg::new("secret")
                        .long("secret")
                        .env("GATEWAY_SIGNING_SECRET")
                        .hide_env_values(true)
                        .help("Signing secret (defaults to signingSecret from config)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print headers as a JSON object"),
                ),
        )
        .subcommand(
            Command::new("weather")
                .about("Query the gateway")
                .arg(
                    Arg::new("url")
                        .long("url")
                        .global(true)
                        .help("Gateway URL including prefix (defaults to the local server)"),
                )
                .arg(
                    Arg::new("sign")
                        .long("sign")
                        .global(true)
                        .action(ArgAction::SetTrue)
                        .help("Sign requests with the configured signing secret"),
                )
                .subcommand(
                    Command::new("current")
                        .about("Current conditions summary")
                        .arg(Arg::new("q").required(true).help("Location query")),
                )
                .subcommand(
                    Command::new("forecast")
                        .about("Daily forecast summary")
                        .arg(Arg::new("q").required(true).help("Location query"))
                        .arg(
                            Arg::new("days")
                                .long("days")
                                .default_value("3")
                                .value_parser(clap::value_parser!(u8).range(1..=10))
                                .help("Number of days (1-10)"),
                        ),
                ),
        )
}

/// Load config with env overrides and set up logging from it
///
/// Validation is left to commands that need a complete gateway config.
fn load_config(path: &str) -> Result<Config> {
    let mut config = Config::load_from_path(path)?;
    config.apply_env_overrides();
    config.expand_env_references();
    crate::init_logging(config.log.as_ref());
    Ok(config)
}

async fn handle_serve_command(config_path: &str, matches: &ArgMatches) -> Result<()> {
    let mut config = load_config(config_path)?;

    let mut http = config.http_config();
    if let Some(host) = matches.get_one::<String>("host") {
        http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        http.port = *port;
    }
    config.http = Some(http);
    config.validate()?;

    crate::http::start_server(config, crate::clock::system_clock()).await
}

async fn handle_serve_counters_command(config_path: &str, matches: &ArgMatches) -> Result<()> {
    let mut config = load_config(config_path)?;

    let mut counters = config.counters.clone().unwrap_or_default();
    if let Some(host) = matches.get_one::<String>("host") {
        counters.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        counters.port = *port;
    }
    if let Some(dsn) = matches.get_one::<String>("dsn") {
        counters.dsn = dsn.clone();
    }
    config.counters = Some(counters);

    crate::ratelimit::service::serve_counters(&config).await
}

fn handle_sign_command(config_path: &str, matches: &ArgMatches) -> Result<()> {
    let config = load_config(config_path)?;

    let secret = matches
        .get_one::<String>("secret")
        .cloned()
        .or(config.signing_secret)
        .ok_or_else(|| {
            GatewayError::config("No signing secret: pass --secret or set signingSecret")
        })?;
    let path = matches
        .get_one::<String>("path")
        .ok_or_else(|| GatewayError::validation("path is required"))?;
    let method = matches
        .get_one::<String>("method")
        .map(|s| s.as_str())
        .unwrap_or("GET");
    let client_id = matches.get_one::<String>("client-id").cloned();

    let envelope = RequestSigner::new(secret, client_id).sign(method, path);

    if matches.get_flag("json") {
        let headers: Map<String, Value> = envelope
            .headers()
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::String(value)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&headers)?);
    } else {
        for (name, value) in envelope.headers() {
            println!("{}: {}", name, value);
        }
    }
    Ok(())
}

async fn handle_weather_command(config_path: &str, matches: &ArgMatches) -> Result<()> {
    let config = load_config(config_path)?;

    let base_url = match matches.get_one::<String>("url") {
        Some(url) => url.clone(),
        None => {
            let http = config.http_config();
            format!("http://{}:{}{}", http.host, http.port, config.proxy_prefix)
        }
    };

    let mut client = WeatherClient::new(
        base_url,
        config.proxy_token.clone(),
        DEFAULT_UPSTREAM_TIMEOUT_MS,
    )?;
    if matches.get_flag("sign") {
        let secret = config
            .signing_secret
            .clone()
            .ok_or_else(|| GatewayError::config("--sign requires signingSecret"))?;
        client = client.with_signer(RequestSigner::new(secret, config.allowed_client_id.clone()));
    }

    let output = match matches.subcommand() {
        Some(("current", sub)) => {
            let q = required_arg(sub, "q")?;
            serde_json::to_value(client.current_summary(q).await?)?
        }
        Some(("forecast", sub)) => {
            let q = required_arg(sub, "q")?;
            let days = sub.get_one::<u8>("days").copied().unwrap_or(3);
            serde_json::to_value(client.forecast_summary(q, days).await?)?
        }
        _ => {
            eprintln!("Specify 'current' or 'forecast'. Use --help for usage information.");
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn required_arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| GatewayError::validation(format!("{} is required", name)))
}
