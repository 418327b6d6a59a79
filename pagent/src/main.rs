#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pagent::run_cli().await
}
