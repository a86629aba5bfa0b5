use adaptation_dw::cli::counts::{run, CountsConfig};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    adaptation_dw::util::env::bootstrap_cli("dw_counts")?;

    run(CountsConfig::default()).await
}
