#[tokio::main]
async fn main() -> depot_dl::Result<()> {
    env_logger::init();
    depot_dl::cli::run().await
}
