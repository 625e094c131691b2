// src/main.rs
use container_loader::api;
use container_loader::config::AppConfig;

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("⚠️ Could not load .env: {}", err);
        }
    }

    let AppConfig { api, optimizer } = AppConfig::from_env();

    println!(
        "🚀 Container loading service starting (default algorithm {})...",
        optimizer.default_algorithm()
    );
    if let Err(err) = api::start_api_server(api, optimizer).await {
        eprintln!("❌ Server stopped: {}", err);
        std::process::exit(1);
    }
}
