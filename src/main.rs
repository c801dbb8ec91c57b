#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stampchain::node::run_cli().await
}
