//! PPS edge capture from a sysfs GPIO line.
//!
//! A dedicated thread blocks in `poll(2)` on the pin's `value` file and
//! stamps each accepted edge into an [`EdgeCapture`]. The thread does
//! nothing else on the edge path.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::error::{GpsNtpError, Result};
use crate::gps::edge::{EdgeCapture, EdgeSource};

/// Default PPS pin (BCM numbering).
pub const DEFAULT_GPIO_PIN: u32 = 18;

/// Default minimum spacing between accepted edges.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default sysfs GPIO class directory.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How often the poll thread checks for shutdown.
const POLL_INTERVAL_MS: u16 = 100;

/// Signal edge that marks the pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    /// Low to high
    Rising,
    /// High to low
    #[default]
    Falling,
    /// Either transition
    Both,
}

impl Edge {
    /// Value written to the pin's `edge` file.
    #[must_use]
    pub fn as_sysfs(self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Both => "both",
        }
    }
}

impl FromStr for Edge {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rising" => Ok(Self::Rising),
            "falling" => Ok(Self::Falling),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown edge {other:?} (expected rising, falling or both)"
            )),
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sysfs())
    }
}

/// GPIO edge source configuration
#[derive(Debug, Clone)]
pub struct GpioConfig {
    /// Pin number (default: 18)
    pub pin: u32,
    /// Edge to capture (default: falling)
    pub edge: Edge,
    /// Minimum spacing between accepted edges (default: 300ms)
    pub debounce: Duration,
    /// sysfs GPIO class directory (default: `/sys/class/gpio`)
    pub sysfs_root: PathBuf,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            pin: DEFAULT_GPIO_PIN,
            edge: Edge::default(),
            debounce: DEFAULT_DEBOUNCE,
            sysfs_root: PathBuf::from(SYSFS_GPIO_ROOT),
        }
    }
}

/// Rejects edges closer than a minimum spacing to the last accepted one.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    min_spacing: Duration,
    last: Option<Instant>,
}

impl Debounce {
    /// Create a filter. A zero spacing accepts every edge.
    #[must_use]
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last: None,
        }
    }

    /// Whether an edge at `now` is accepted. Rejected edges do not restart
    /// the spacing window.
    pub fn accept(&mut self, now: Instant) -> bool {
        let accepted = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_spacing);
        if accepted {
            self.last = Some(now);
        }
        accepted
    }
}

/// Running sysfs edge watcher.
#[derive(Debug)]
pub struct GpioEdgeSource {
    pin: u32,
    sysfs_root: PathBuf,
    exported: bool,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl GpioEdgeSource {
    /// Configure the pin as an edge-triggered input and start the watcher
    /// thread. The pin is exported first if needed and unexported again on
    /// [`disable`](EdgeSource::disable).
    ///
    /// # Errors
    ///
    /// Returns [`GpsNtpError::EdgeSource`] if the pin cannot be configured
    /// or the thread cannot be spawned.
    pub fn start(config: &GpioConfig, capture: Arc<EdgeCapture>) -> Result<Self> {
        let pin = config.pin;
        let root = config.sysfs_root.clone();
        let pin_dir = root.join(format!("gpio{pin}"));

        let exported = !pin_dir.exists();
        if exported {
            fs::write(root.join("export"), pin.to_string())
                .map_err(|e| edge_error(format!("failed to export GPIO {pin}"), e))?;
        }

        let value = match configure_input(&pin_dir, config.edge) {
            Ok(value) => value,
            Err(e) => {
                release_export(&root, pin, exported);
                return Err(edge_error(format!("failed to configure GPIO {pin}"), e));
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let debounce = Debounce::new(config.debounce);
        let thread = std::thread::Builder::new()
            .name(format!("pps-gpio{pin}"))
            .spawn({
                let stop = stop.clone();
                move || watch_edges(value, &capture, debounce, &stop)
            })
            .map_err(|e| {
                release_export(&root, pin, exported);
                edge_error("failed to spawn GPIO thread".to_string(), e)
            })?;

        tracing::info!(
            pin,
            edge = %config.edge,
            debounce = ?config.debounce,
            "PPS edge capture started"
        );

        Ok(Self {
            pin,
            sysfs_root: root,
            exported,
            stop,
            thread: Some(thread),
        })
    }

    /// Pin number.
    #[must_use]
    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Whether the watcher thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl EdgeSource for GpioEdgeSource {
    fn disable(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        if thread.join().is_err() {
            tracing::error!(pin = self.pin, "GPIO thread panicked");
        }
        release_export(&self.sysfs_root, self.pin, self.exported);
        tracing::info!(pin = self.pin, "PPS edge capture stopped");
    }
}

impl Drop for GpioEdgeSource {
    fn drop(&mut self) {
        self.disable();
    }
}

fn configure_input(pin_dir: &Path, edge: Edge) -> io::Result<File> {
    fs::write(pin_dir.join("direction"), "in")?;
    fs::write(pin_dir.join("edge"), edge.as_sysfs())?;
    let mut value = File::open(pin_dir.join("value"))?;
    // Consume the current level so the first poll waits for a real edge.
    let mut level = String::new();
    value.read_to_string(&mut level)?;
    Ok(value)
}

/// Unexport `pin` if this process exported it.
pub(crate) fn release_export(root: &Path, pin: u32, exported: bool) {
    if !exported {
        return;
    }
    if let Err(e) = fs::write(root.join("unexport"), pin.to_string()) {
        tracing::warn!(pin, error = %e, "failed to unexport GPIO");
    }
}

fn edge_error(message: String, source: io::Error) -> GpsNtpError {
    GpsNtpError::EdgeSource {
        message,
        source: Some(source),
    }
}

fn watch_edges(mut value: File, capture: &EdgeCapture, mut debounce: Debounce, stop: &AtomicBool) {
    let mut level = String::new();
    while !stop.load(Ordering::Acquire) {
        let revents = {
            let mut fds = [PollFd::new(
                value.as_fd(),
                PollFlags::POLLPRI | PollFlags::POLLERR,
            )];
            match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => fds[0].revents().unwrap_or_else(PollFlags::empty),
                Err(e) => {
                    tracing::error!(error = %e, "GPIO poll failed, edge capture stopped");
                    return;
                }
            }
        };

        if revents.contains(PollFlags::POLLNVAL) {
            tracing::error!("GPIO value file closed, edge capture stopped");
            return;
        }
        if revents.intersects(PollFlags::POLLPRI | PollFlags::POLLERR)
            && debounce.accept(Instant::now())
        {
            capture.on_edge();
        }

        // sysfs re-arms the interrupt once the value has been read again.
        level.clear();
        if let Err(e) = value
            .seek(SeekFrom::Start(0))
            .and_then(|_| value.read_to_string(&mut level))
        {
            tracing::error!(error = %e, "GPIO value read failed, edge capture stopped");
            return;
        }
    }
}
