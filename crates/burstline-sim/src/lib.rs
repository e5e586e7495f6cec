//! # Burstline Devices and Transmission
//!
//! Device side of burstline: a transmit-only hardware abstraction, the
//! drivers behind it, and the loop that plays a [`Blockchain`] through a
//! TX stream with device time tags.
//!
//! - **Devices**: errors, capabilities, sync sources ([`device`])
//! - **HAL**: stream/tuner/clock traits, UHD model, loopback ([`hal`])
//! - **Transmit loop**: bursts to sends, partial-send retry, ACKs ([`xmit`])
//! - **Sessions**: device ownership and the TX thread ([`manager`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use burstline_core::config::TransmitConfig;
//! use burstline_core::Blockchain;
//! use burstline_sim::hal::create_default_registry;
//! use burstline_sim::TxManager;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = create_default_registry().create("loopback://")?;
//! let mut manager = TxManager::new(device, TransmitConfig::default());
//! manager.setup_for_xmit(&[0], 1_000_000.0, 915e6, 0.0)?;
//!
//! let mut chain = Blockchain::new(1_000_000.0)?;
//! chain.append("a.cf32", 2.0, 3)?;
//! manager.start(Arc::new(chain))?;
//! let report = manager.wait()?;
//! println!("{} bursts sent", report.bursts);
//! # Ok(())
//! # }
//! ```
//!
//! [`Blockchain`]: burstline_core::Blockchain

pub mod device;
pub mod hal;
pub mod manager;
pub mod xmit;

pub use device::{DeviceCapabilities, DeviceInfo, SdrError, SdrResult, SyncSource};
pub use hal::{create_default_registry, DriverRegistry, TxDevice, TxMetadata, TxStreamer};
pub use manager::TxManager;
pub use xmit::{TransmitParams, TransmitReport};
