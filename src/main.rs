use std::env;

use anyhow::{Context, Result};
use tuya_relay::{HeaderSource, ServerConfig, TuyaClient};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let show_headers = match args.get(1).map(String::as_str) {
        None => false,
        Some("--headers") => true,
        Some(_) => {
            eprintln!("Usage: {} [--headers]", args[0]);
            eprintln!("  Fetches the configured device once and prints the response.");
            eprintln!("  --headers: also print the outbound auth headers");
            std::process::exit(1);
        }
    };

    let _ = dotenvy::dotenv();
    let config = ServerConfig::from_env().context("Invalid configuration")?;

    let client = match config.static_headers.clone() {
        Some(fixed) => TuyaClient::with_header_source(
            config.credentials.clone(),
            HeaderSource::Static(fixed),
        )?,
        None => TuyaClient::new(config.credentials.clone())?,
    };

    if show_headers {
        let headers = client.auth_headers(&client.credentials().device_path())?;
        for (name, value) in &headers {
            println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        println!();
    }

    println!("Fetching {}...", client.credentials().device_url());
    let response = client.get_device().await.context("Device fetch failed")?;

    println!("Status: {}", response.status);
    println!("{}", String::from_utf8_lossy(&response.body));

    Ok(())
}
