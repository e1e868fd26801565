use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    atelier_cli::run().await
}
