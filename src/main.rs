use anyhow::Result;
use appkernel::{cli::Cli, run};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
