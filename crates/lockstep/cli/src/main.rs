//! Lockstep CLI binary

#[tokio::main]
async fn main() {
    if let Err(e) = lockstep::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
