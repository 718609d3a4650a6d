#[tokio::main]
async fn main() {
    if let Err(e) = tradelink_server::run().await {
        log::error!("[tradelink.startup] {}", e);
        eprintln!("tradelink-server: {}", e);
        std::process::exit(1);
    }
}
