#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eventra_gateway::cli::run().await
}
