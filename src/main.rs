//! Weather Gateway CLI
//!
//! Run with: cargo run --bin gateway -- <command>
//! Or after build: ./target/release/gateway <command>

#[tokio::main]
async fn main() {
    // Load .env before configuration so GATEWAY_* overrides apply
    let _ = dotenvy::dotenv();

    // Logging is initialized once configuration is loaded
    if let Err(e) = weather_gateway::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
