//! Serial tty in raw mode as an async byte stream.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use nix::sys::termios::{self, BaudRate, SetArg};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{GpsNtpError, Result};

/// Default receiver device.
pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";

/// Default line speed.
pub const DEFAULT_BAUD: u32 = 38_400;

/// Map a numeric line speed to a termios rate.
#[must_use]
pub fn baud_rate(baud: u32) -> Option<BaudRate> {
    let rate = match baud {
        4_800 => BaudRate::B4800,
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        _ => return None,
    };
    Some(rate)
}

/// Non-blocking serial device registered with the tokio reactor.
///
/// Dropping it closes the file descriptor.
#[derive(Debug)]
pub struct SerialDevice {
    inner: AsyncFd<File>,
    path: PathBuf,
}

impl SerialDevice {
    /// Open `path`, switch it to raw mode at `baud`, and register it with
    /// the runtime. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GpsNtpError::InvalidConfig`] for an unsupported baud rate
    /// and [`GpsNtpError::DeviceOpen`] if the device cannot be opened or is
    /// not a terminal.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rate = baud_rate(baud).ok_or_else(|| GpsNtpError::InvalidConfig {
            name: "baud".to_string(),
            message: format!("unsupported line speed {baud}"),
        })?;
        let open_error = |source: io::Error| GpsNtpError::DeviceOpen {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NOCTTY | nix::libc::O_NONBLOCK)
            .open(&path)
            .map_err(open_error)?;

        configure_raw(&file, rate).map_err(open_error)?;
        let inner = AsyncFd::new(file).map_err(open_error)?;
        tracing::info!(path = %path.display(), baud, "serial device opened");

        Ok(Self { inner, path })
    }

    /// Device path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn configure_raw(file: &File, rate: BaudRate) -> io::Result<()> {
    let mut attrs = termios::tcgetattr(file)?;
    termios::cfmakeraw(&mut attrs);
    termios::cfsetspeed(&mut attrs, rate)?;
    termios::tcsetattr(file, SetArg::TCSANOW, &attrs)?;
    Ok(())
}

impl AsyncRead for SerialDevice {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => {}
            }
        }
    }
}
