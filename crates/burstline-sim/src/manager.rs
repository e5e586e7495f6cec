//! # Transmit Session Manager
//!
//! [`TxManager`] owns a device and runs at most one transmit session on it
//! at a time.
//!
//! ```text
//!   controller thread                    burstline-tx thread
//!   ─────────────────                    ───────────────────
//!   set_sync_source()
//!   setup_for_xmit()  ── TX stream ──┐
//!   start(chain) ────────────────────┴──► xmit::run(stream, chain)
//!   is_transmitting() ◄── in-progress flag ──┤
//!   stop() ── cancel flag ──────────────────►│
//!          ◄── report via join, stream via slot ─┘
//! ```
//!
//! The TX stream moves onto the session thread through a shared slot and is
//! put back there before the thread exits, so it survives a failed session
//! and a failed spawn. While a session runs, every configuration call and
//! any second `start` fail with [`SdrError::AlreadyRunning`].

use crate::device::{SdrError, SdrResult};
use crate::hal::{ChannelSettings, StreamConfig, SyncSource, TxDevice, TxStreamer};
use crate::xmit::{self, TransmitParams, TransmitReport};
use burstline_core::config::TransmitConfig;
use burstline_core::Blockchain;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

type StreamSlot = Arc<Mutex<Option<Box<dyn TxStreamer>>>>;

fn lock_slot(slot: &StreamSlot) -> MutexGuard<'_, Option<Box<dyn TxStreamer>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Session {
    cancel: Arc<AtomicBool>,
    slot: StreamSlot,
    handle: JoinHandle<SdrResult<TransmitReport>>,
}

/// Clears the in-progress flag when the session thread exits, even by panic.
struct InProgressGuard(Arc<AtomicBool>);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Device owner and transmit session controller.
pub struct TxManager {
    device: Box<dyn TxDevice>,
    transmit: TransmitConfig,
    streamer: Option<Box<dyn TxStreamer>>,
    settings: Vec<ChannelSettings>,
    sync_configured: bool,
    in_progress: Arc<AtomicBool>,
    session: Option<Session>,
}

impl TxManager {
    pub fn new(device: Box<dyn TxDevice>, transmit: TransmitConfig) -> Self {
        info!(device = device.name(), "Transmit manager ready");
        Self {
            device,
            transmit,
            streamer: None,
            settings: Vec::new(),
            sync_configured: false,
            in_progress: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    pub fn device(&self) -> &dyn TxDevice {
        self.device.as_ref()
    }

    pub fn transmit_config(&self) -> &TransmitConfig {
        &self.transmit
    }

    /// Settings each channel ended up with in the last `setup_for_xmit`.
    pub fn channel_settings(&self) -> &[ChannelSettings] {
        &self.settings
    }

    /// Whether a session is running.
    pub fn is_transmitting(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Select the device's clock and time source.
    pub fn set_sync_source(&mut self, sync: SyncSource) -> SdrResult<()> {
        self.ensure_idle()?;
        self.device.clock().set_sync_source(sync)?;
        self.sync_configured = true;
        info!(%sync, "Sync source configured");
        Ok(())
    }

    /// Tune every channel in `channels` and acquire a TX stream over them.
    ///
    /// Values the device does not honor exactly are logged and kept.
    /// Requests outside the device's capabilities are rejected before
    /// anything is retuned, leaving the previous setup usable.
    pub fn setup_for_xmit(
        &mut self,
        channels: &[usize],
        sample_rate: f64,
        center_frequency: f64,
        gain: f64,
    ) -> SdrResult<Vec<ChannelSettings>> {
        self.ensure_idle()?;

        let caps = self.device.capabilities();
        let available = caps.tx_channels;
        if channels.is_empty() {
            return Err(SdrError::ConfigError(
                "At least one TX channel is required".to_string(),
            ));
        }
        if let Some(&channel) = channels.iter().find(|&&c| c >= available) {
            return Err(SdrError::InvalidChannel { channel, available });
        }
        check_range("Sample rate", sample_rate, caps.min_sample_rate, caps.max_sample_rate)?;
        check_range("Center frequency", center_frequency, caps.min_frequency, caps.max_frequency)?;

        let result = self.tune(channels, sample_rate, center_frequency, gain).and_then(|settings| {
            let streamer = self
                .device
                .create_tx_stream(&StreamConfig::new(channels.to_vec()))?;
            Ok((settings, streamer))
        });
        let (settings, streamer) = match result {
            Ok(ready) => ready,
            Err(e) => {
                // Channels may be partly retuned; the old stream no longer matches them.
                self.streamer = None;
                self.settings.clear();
                return Err(e);
            }
        };
        info!(
            channels = ?channels,
            max_samples_per_call = streamer.max_samples_per_call(),
            "Ready to transmit"
        );

        self.streamer = Some(streamer);
        self.settings = settings.clone();
        Ok(settings)
    }

    fn tune(
        &mut self,
        channels: &[usize],
        sample_rate: f64,
        center_frequency: f64,
        gain: f64,
    ) -> SdrResult<Vec<ChannelSettings>> {
        let mut settings = Vec::with_capacity(channels.len());
        for &channel in channels {
            let tuner = self.device.tuner();
            let actual = ChannelSettings {
                channel,
                sample_rate: tuner.set_tx_rate(channel, sample_rate)?,
                center_frequency: tuner.set_tx_frequency(channel, center_frequency)?,
                gain: tuner.set_tx_gain(channel, gain)?,
            };
            warn_if_differs(channel, "sample rate", sample_rate, actual.sample_rate);
            warn_if_differs(channel, "center frequency", center_frequency, actual.center_frequency);
            warn_if_differs(channel, "gain", gain, actual.gain);
            debug!(?actual, "Channel configured");
            settings.push(actual);
        }
        Ok(settings)
    }

    /// Start transmitting `chain` on a new session thread.
    pub fn start(&mut self, chain: Arc<Blockchain>) -> SdrResult<()> {
        self.ensure_idle()?;

        if chain.is_empty() {
            return Err(SdrError::ConfigError(
                "Cannot transmit an empty blockchain".to_string(),
            ));
        }
        let streamer = self.streamer.take().ok_or_else(|| {
            SdrError::NotConfigured("call setup_for_xmit before starting".to_string())
        })?;

        if let Some(first) = self.settings.first() {
            if first.sample_rate != chain.sample_rate() {
                warn!(
                    chain_rate = chain.sample_rate(),
                    device_rate = first.sample_rate,
                    "Chain was validated at a different sample rate than the device runs at"
                );
            }
        }
        if !self.sync_configured {
            debug!(sync = %self.device.clock().sync_source(), "Using device default sync source");
        }

        let max = streamer.max_samples_per_call();
        let reference_time = self.device.clock().time() + self.transmit.start_delay();
        let params = TransmitParams::from_config(&self.transmit, max, reference_time);
        if params.chunk_size > max {
            debug!(
                chunk_size = params.chunk_size,
                max_samples_per_call = max,
                "Chunks exceed one send call and will go out in parts"
            );
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let slot: StreamSlot = Arc::new(Mutex::new(Some(streamer)));
        self.in_progress.store(true, Ordering::SeqCst);
        let guard = InProgressGuard(Arc::clone(&self.in_progress));
        let thread_cancel = Arc::clone(&cancel);
        let thread_slot = Arc::clone(&slot);

        let spawned = std::thread::Builder::new()
            .name("burstline-tx".to_string())
            .spawn(move || {
                let _guard = guard;
                let Some(mut streamer) = lock_slot(&thread_slot).take() else {
                    return Err(SdrError::NotConfigured("TX stream is gone".to_string()));
                };
                let result = xmit::run(streamer.as_mut(), &chain, &params, &thread_cancel);
                *lock_slot(&thread_slot) = Some(streamer);
                result
            });

        match spawned {
            Ok(handle) => {
                self.session = Some(Session {
                    cancel,
                    slot,
                    handle,
                });
                Ok(())
            }
            Err(e) => {
                self.in_progress.store(false, Ordering::SeqCst);
                self.streamer = lock_slot(&slot).take();
                Err(SdrError::HardwareError(format!(
                    "Failed to spawn transmit thread: {}",
                    e
                )))
            }
        }
    }

    /// Cancel the running session and wait for it to finish its current burst.
    pub fn stop(&mut self) -> SdrResult<TransmitReport> {
        let session = self.session.as_ref().ok_or_else(|| {
            SdrError::NotConfigured("no transmit session to stop".to_string())
        })?;
        info!("Stopping transmit session");
        session.cancel.store(true, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the session to end by itself (the chain runs out).
    pub fn wait(&mut self) -> SdrResult<TransmitReport> {
        if self.session.is_none() {
            return Err(SdrError::NotConfigured(
                "no transmit session to wait for".to_string(),
            ));
        }
        self.join()
    }

    /// Whether a session has ended and not been collected with `stop`/`wait`.
    pub fn is_finished(&self) -> bool {
        self.session.is_some() && !self.is_transmitting()
    }

    fn join(&mut self) -> SdrResult<TransmitReport> {
        let Some(session) = self.session.take() else {
            return Err(SdrError::NotConfigured("no transmit session".to_string()));
        };
        let joined = session.handle.join();
        self.streamer = lock_slot(&session.slot).take();
        if self.streamer.is_none() {
            // The stream went down with the thread; setup is needed again.
            self.settings.clear();
        }
        joined.unwrap_or_else(|_| {
            Err(SdrError::HardwareError(
                "Transmit thread panicked".to_string(),
            ))
        })
    }

    /// Fail if a session runs; collect one that already ended.
    ///
    /// The error of an uncollected failed session is returned here, once.
    /// The stream is restored before that, so the next call goes through.
    fn ensure_idle(&mut self) -> SdrResult<()> {
        if self.is_transmitting() {
            return Err(SdrError::AlreadyRunning);
        }
        if self.session.is_some() {
            let report = self.join()?;
            debug!(bursts = report.bursts, "Collected finished session");
        }
        Ok(())
    }
}

impl Drop for TxManager {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.store(true, Ordering::SeqCst);
            let _ = self.join();
        }
    }
}

fn check_range(what: &str, value: f64, min: f64, max: f64) -> SdrResult<()> {
    if !(min..=max).contains(&value) {
        return Err(SdrError::ConfigError(format!(
            "{} {} out of range [{}, {}]",
            what, value, min, max
        )));
    }
    Ok(())
}

fn warn_if_differs(channel: usize, what: &str, requested: f64, actual: f64) {
    if requested != actual {
        warn!(channel, requested, actual, "Device did not honor {}", what);
    }
}
