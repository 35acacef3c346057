//! Rust library for controlling multi-zone ProAudio amplifiers
//!
//! The amplifier is driven over a plain TCP text protocol. This library keeps
//! one persistent connection open, encodes zone commands into the wire syntax
//! and decodes the asynchronous status lines the amplifier sends back. It
//! supports:
//!
//! - Power, mute, volume (absolute and relative) and source control per zone
//! - Full status refresh of a zone
//! - Automatic reconnect with a fixed delay
//! - Ordered delivery of decoded status updates to a single subscriber
//!
//! # Quick Start
//!
//! ```no_run
//! use proaudio_amp::{AmpConfig, AmpController, AmpEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let amp = AmpController::new(
//!         AmpConfig::new("10.0.50.166", 50005),
//!         |event: AmpEvent| async move {
//!             match event {
//!                 AmpEvent::Status(status) => println!("Zone {}: {:?}", status.zone, status.status),
//!                 AmpEvent::ParseError(e) => eprintln!("{}", e),
//!             }
//!         },
//!     );
//!
//!     amp.connect().await;
//!     amp.wait_connected().await?;
//!
//!     amp.power_on(4).await?;
//!     amp.set_source(4, 2).await?;
//!     amp.get_status(4).await?;
//!
//!     tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
//!     amp.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Controller**: zone-addressed API and event dispatch
//! - **Connection**: socket lifecycle, line delivery and reconnect
//! - **Framing**: CRLF line splitting across reads
//! - **Protocol**: command encoding and status decoding
//! - **Types**: status events and identifiers

mod config;
mod connection;
mod controller;
mod error;
mod framing;
pub mod logging;
pub mod protocol;
mod types;

// Public exports
pub use config::{AmpConfig, DEFAULT_PORT, DEFAULT_RECONNECT_DELAY};
pub use connection::{Connection, ConnectionState};
pub use controller::{AmpController, StatusSubscriber, DEFAULT_VOLUME_STEP};
pub use error::{AmpError, ParseError, Result};
pub use framing::{Frame, LineFramer, MAX_LINE_LENGTH};
pub use logging::{init_logging, LoggingMode};
pub use protocol::{CommandValue, Opcode, ZoneCommand};
pub use types::{AmpEvent, Attribute, SourceId, StatusEvent, VolumeLevel, ZoneId, ZoneStatus};
