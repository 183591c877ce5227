use std::fs::File;
use std::io::{Read, Write};

use crate::error::Result;

/// A connected link to the board. Implements Read + Write.
///
/// On real hardware this wraps the serial device node. Board simulators and
/// tests can use a Unix stream instead; the protocol layers cannot tell the
/// difference.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Device(File),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Device(file) => file.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Device(file) => file.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Device(file) => file.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl LinkStream {
    /// Wrap an already opened device file.
    pub(crate) fn from_file(file: File) -> Self {
        Self {
            inner: LinkStreamInner::Device(file),
        }
    }

    /// Wrap a connected Unix stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Connect to a board simulator listening on a Unix socket.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            crate::error::TransportError::Connect {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!(?path, "connected to board simulator socket");
        Ok(Self::from_unix(stream))
    }

    /// Create a connected in-process pair, one end for the host and one for
    /// a simulated board.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to split one link into an independent reader and writer.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkStreamInner::Device(file) => Ok(Self::from_file(file.try_clone()?)),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Device(_) => "serial-device",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix-stream",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.kind())
            .finish()
    }
}
