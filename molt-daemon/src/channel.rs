//! Duplex local channel between the parent and the update daemon.
//!
//! A connected `AF_UNIX` stream pair. Both ends are close-on-exec so later
//! spawns never inherit them; the one spawn that should get the child end
//! has it duplicated onto [`CHANNEL_FD`] between fork and exec.
//!
//! Only single-byte signals travel over it: "ready" from the child and
//! "released" from the parent. The byte value carries no meaning.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::Command;

use crate::error::DaemonError;
use crate::paths::CHANNEL_FD;

const SIGNAL: u8 = 0;

/// What the other side did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A signal byte arrived.
    Signal,
    /// The peer closed its end (usually because its process exited).
    Closed,
}

/// Create a connected pair. Returns `(parent_side, child_side)`.
pub fn pair(nonblocking: bool) -> io::Result<(StdUnixStream, StdUnixStream)> {
    let (parent, child) = StdUnixStream::pair()?;
    for end in [&parent, &child] {
        set_cloexec(end.as_raw_fd())?;
        end.set_nonblocking(nonblocking)?;
    }
    Ok((parent, child))
}

/// Arrange for `fd` to show up at [`CHANNEL_FD`] in the process `cmd` spawns.
pub fn attach(cmd: &mut Command, fd: RawFd) {
    // SAFETY: the closure only calls async-signal-safe libc functions
    // (fcntl, dup2) and allocates nothing.
    unsafe {
        cmd.pre_exec(move || {
            if fd == CHANNEL_FD {
                // dup2 onto itself would keep FD_CLOEXEC set.
                let flags = libc::fcntl(fd, libc::F_GETFD);
                if flags == -1 || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) == -1 {
                    return Err(io::Error::last_os_error());
                }
            } else if libc::dup2(fd, CHANNEL_FD) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Take ownership of the endpoint the parent left at [`CHANNEL_FD`].
///
/// Succeeds at most once per process. The descriptor is marked close-on-exec
/// again so a relaunched instance does not inherit it.
pub fn take_inherited() -> Result<StdUnixStream, DaemonError> {
    static TAKEN: AtomicBool = AtomicBool::new(false);
    if TAKEN.swap(true, Ordering::SeqCst) {
        return Err(DaemonError::EndpointTaken);
    }

    if !is_unix_stream(CHANNEL_FD) {
        return Err(DaemonError::EndpointMissing { fd: CHANNEL_FD });
    }
    set_cloexec(CHANNEL_FD).map_err(DaemonError::Channel)?;

    // SAFETY: the descriptor is open and is a stream socket (checked above),
    // and TAKEN guarantees no other owner is created in this process.
    let stream = unsafe { StdUnixStream::from_raw_fd(CHANNEL_FD) };
    Ok(stream)
}

/// One side of the channel, driven by tokio.
#[derive(Debug)]
pub struct Endpoint {
    stream: UnixStream,
}

impl Endpoint {
    /// Must be called inside a tokio runtime.
    pub fn from_std(stream: StdUnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: UnixStream::from_std(stream)?,
        })
    }

    /// Send one signal byte.
    pub async fn notify(&mut self) -> io::Result<()> {
        self.stream.write_all(&[SIGNAL]).await?;
        self.stream.flush().await
    }

    /// Wait for the next signal or for the peer to close.
    pub async fn wait(&mut self) -> io::Result<Event> {
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf).await? {
            0 => Ok(Event::Closed),
            _ => Ok(Event::Signal),
        }
    }

    /// Report an event that has already arrived without waiting for one.
    /// A reset connection counts as closed.
    pub fn try_wait(&self) -> io::Result<Option<Event>> {
        let mut buf = [0u8; 1];
        // SAFETY: buf is valid for a write of one byte. recv directly: the
        // reactor may not have seen the byte yet.
        let n = unsafe {
            libc::recv(
                self.stream.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                1,
                libc::MSG_DONTWAIT,
            )
        };
        match n {
            0 => Ok(Some(Event::Closed)),
            n if n > 0 => Ok(Some(Event::Signal)),
            _ => {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => Ok(None),
                    io::ErrorKind::ConnectionReset => Ok(Some(Event::Closed)),
                    _ => Err(err),
                }
            }
        }
    }

    /// Like [`Endpoint::wait`], but `Ok(None)` once `limit` elapses.
    pub async fn wait_timeout(&mut self, limit: Duration) -> io::Result<Option<Event>> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(event) => event.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor number has no memory-safety requirements.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags == -1 || libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn is_unix_stream(fd: RawFd) -> bool {
    let mut sock_type: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: sock_type and len are valid for writes of the sizes passed.
    unsafe {
        libc::fcntl(fd, libc::F_GETFD) != -1
            && libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_TYPE,
                &mut sock_type as *mut _ as *mut libc::c_void,
                &mut len,
            ) == 0
            && sock_type == libc::SOCK_STREAM
    }
}
