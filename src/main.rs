#[tokio::main]
async fn main() {
    if let Err(e) = abrlab_lib::run().await {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
