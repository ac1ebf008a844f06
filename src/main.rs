use anyhow::Result;
use pocketchat::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
