use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    sopcheck_cli::run_cli().await
}
