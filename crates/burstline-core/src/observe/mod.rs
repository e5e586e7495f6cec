//! # Observability
//!
//! Structured logging via `tracing`. Library code only emits events; the
//! binary decides where they go by calling [`init_logging`] once at startup.
//!
//! | Level   | Used for |
//! |---------|----------|
//! | `error` | Session ended by a fatal stream or device error |
//! | `warn`  | Device did not honor a setting, non-ack async events, missing acks |
//! | `info`  | Session lifecycle, device configuration |
//! | `debug` | Block passes, file opens |
//! | `trace` | Per-chunk transfer state |

mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
