//! Regime Trader - command-line entry point

use anyhow::Result;
use regime_trader::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (machine-specific overrides go here, not in the TOML)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
