//! A background thread that keeps the configuration fresh, by polling periodically and on demand.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{RecvTimeoutError, SyncSender, TrySendError},
        Arc,
    },
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{configuration_handler::ConfigurationHandler, Error, Result};

/// Configuration for [`PollerThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct PollerThreadConfig {
    /// Interval to wait between requests for configuration.
    pub interval: Duration,
    /// Randomized duration subtracted from `interval`. This helps to avoid multiple server
    /// instances synchronizing and producing spiky network load.
    pub jitter: Duration,
}

impl PollerThreadConfig {
    /// Default value for [`PollerThreadConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`PollerThreadConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            interval: PollerThreadConfig::DEFAULT_POLL_INTERVAL,
            jitter: PollerThreadConfig::DEFAULT_POLL_JITTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerCommand {
    Refresh,
    Stop,
}

/// Asks the poller thread to refresh the configuration now, e.g. when a push channel reports
/// that the configuration has changed.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    sender: SyncSender<PollerCommand>,
}

impl RefreshHandle {
    /// Request a refresh. Returns `false` if the poller thread has stopped.
    ///
    /// Requests made while another one is pending are merged with it.
    pub fn request_refresh(&self) -> bool {
        match self.sender.try_send(PollerCommand::Refresh) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// A configuration poller thread.
///
/// The poller thread refreshes the configuration through [`ConfigurationHandler::load_data`]
/// every poll interval, and whenever a [`RefreshHandle`] requests it.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send commands to the poller thread.
    sender: SyncSender<PollerCommand>,

    /// Set once the poller must exit. Checked on every wake-up, as the `Stop` command may not fit
    /// in the channel while a refresh is pending.
    stopped: Arc<AtomicBool>,
}

impl PollerThread {
    /// Starts the configuration poller thread. The first refresh happens after one interval, as
    /// the context is expected to have loaded the configuration already.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the thread failed to start.
    pub fn start(
        handler: Arc<ConfigurationHandler>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread> {
        // A buffer of one is enough: a pending refresh absorbs further refresh requests, and
        // stopping goes through `stopped`.
        let (sender, receiver) = std::sync::mpsc::sync_channel::<PollerCommand>(1);
        let stopped = Arc::new(AtomicBool::new(false));
        let thread_stopped = stopped.clone();

        let join_handle = std::thread::Builder::new()
            .name("appconfiguration-poller".to_owned())
            .spawn(move || loop {
                let timeout = jitter(config.interval, config.jitter);
                match receiver.recv_timeout(timeout) {
                    Err(RecvTimeoutError::Timeout) => {
                        log::debug!(target: "appconfiguration", "poll interval elapsed");
                    }
                    Ok(PollerCommand::Refresh) => {
                        log::debug!(target: "appconfiguration", "poller thread received refresh command");
                    }
                    Ok(PollerCommand::Stop) => {
                        log::debug!(target: "appconfiguration", "poller thread received stop command");
                        return;
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        log::debug!(target: "appconfiguration", "poller thread received disconnected");
                        return;
                    }
                }
                if thread_stopped.load(Ordering::Acquire) {
                    log::debug!(target: "appconfiguration", "poller thread stopped");
                    return;
                }

                // Failures are logged by the handler. Retrievable errors wait for the next tick.
                if let Err(err) = handler.load_data() {
                    if err.is_unrecoverable() {
                        log::error!(target: "appconfiguration", "stopping poller thread: {err}");
                        return;
                    }
                }
            })?;

        Ok(PollerThread {
            join_handle,
            sender,
            stopped,
        })
    }

    /// Returns a handle that can request immediate refreshes.
    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            sender: self.sender.clone(),
        }
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop. A load in progress completes,
    /// and no other load is started afterward.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // A full channel holds a pending command that wakes the thread up anyway. A disconnected
        // one means the thread has exited.
        let _ = self.sender.try_send(PollerCommand::Stop);
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`PollerThread::stop`] instead.
    ///
    /// # Errors
    ///
    /// - [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
