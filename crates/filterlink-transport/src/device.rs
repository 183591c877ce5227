use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// How a device node is prepared before the protocol takes over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Time to wait after opening before discarding pending input.
    /// The board keeps printing while the host attaches; anything it sent
    /// before we were listening is not frame-aligned.
    pub settle_delay: Duration,
    /// Discard bytes already queued in the input buffer after settling.
    pub flush_input: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            flush_input: true,
        }
    }
}

/// Serial device transport.
///
/// Terminals are switched to raw mode on open so the line discipline passes
/// frame bytes through untouched. Baud rate and parity are left as the OS
/// configured them; CDC-ACM devices ignore them anyway.
pub struct SerialDevice;

impl SerialDevice {
    /// Open a device node with default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<LinkStream> {
        Self::open_with_config(path, &DeviceConfig::default())
    }

    /// Open a device node in raw mode, wait for it to settle and flush
    /// stale input.
    ///
    /// This blocks for `settle_delay` and must happen before the first read.
    pub fn open_with_config(path: impl AsRef<Path>, config: &DeviceConfig) -> Result<LinkStream> {
        let path = path.as_ref().to_path_buf();

        let file = open_options()
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        make_raw(&file, &path)?;

        if !config.settle_delay.is_zero() {
            debug!(?path, delay = ?config.settle_delay, "waiting for device to settle");
            std::thread::sleep(config.settle_delay);
        }

        if config.flush_input {
            flush_input(&file, &path)?;
        }

        info!(?path, "opened serial device");
        Ok(LinkStream::from_file(file))
    }
}

#[cfg(unix)]
fn open_options() -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    // The board must not become our controlling terminal.
    options.read(true).write(true).custom_flags(libc::O_NOCTTY);
    options
}

#[cfg(not(unix))]
fn open_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    options
}

/// Disable the line discipline: no newline translation, no echo, no
/// canonical line buffering.
#[cfg(unix)]
fn make_raw(file: &File, path: &Path) -> Result<()> {
    use std::os::fd::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: termios is plain old data and tcgetattr fills it before use.
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: the descriptor belongs to `file`, which outlives this call.
    if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOTTY) {
            debug!(?path, "not a terminal; leaving line settings alone");
            return Ok(());
        }
        return Err(TransportError::Configure {
            path: path.to_path_buf(),
            source: err,
        });
    }

    // SAFETY: `termios` was initialized by tcgetattr above.
    unsafe { libc::cfmakeraw(&mut termios) };
    // SAFETY: as above; `termios` is a valid settings block for `fd`.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(TransportError::Configure {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    debug!(?path, "switched terminal to raw mode");
    Ok(())
}

#[cfg(not(unix))]
fn make_raw(_file: &File, path: &Path) -> Result<()> {
    debug!(?path, "raw mode unsupported on this platform");
    Ok(())
}

#[cfg(unix)]
fn flush_input(file: &File, path: &Path) -> Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives this call.
    let rc = unsafe { libc::tcflush(file.as_raw_fd(), libc::TCIFLUSH) };
    if rc == 0 {
        debug!(?path, "flushed pending input");
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENOTTY) {
        // Plain files and pipes have no input queue to discard.
        debug!(?path, "not a terminal; skipping input flush");
        return Ok(());
    }

    Err(TransportError::Flush {
        path: path.to_path_buf(),
        source: err,
    })
}

#[cfg(not(unix))]
fn flush_input(_file: &File, path: &Path) -> Result<()> {
    debug!(?path, "input flush unsupported on this platform");
    Ok(())
}
