#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ddosguard_lib::run().await
}
