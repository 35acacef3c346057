//! Connect to an amplifier, query one zone and print whatever it reports.
//!
//! Usage: `cargo run --example status -- <host> [port] [zone]`

use proaudio_amp::{init_logging, AmpConfig, AmpController, AmpEvent, LoggingMode, DEFAULT_PORT};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingMode::Debug)?;

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "10.0.50.166".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };
    let zone = match args.next() {
        Some(zone) => zone.parse()?,
        None => 4,
    };

    let amp = AmpController::new(AmpConfig::new(host, port), |event: AmpEvent| async move {
        match event {
            AmpEvent::Status(status) => match serde_json::to_string(&status) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to encode status: {}", e),
            },
            AmpEvent::ParseError(e) => eprintln!("{}", e),
        }
    });

    amp.connect().await;
    amp.wait_connected().await?;
    amp.get_status(zone).await?;

    tokio::time::sleep(Duration::from_secs(10)).await;
    amp.close().await;

    Ok(())
}
