// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native socket handles and the level-triggered readiness poll.
//!
//! - On Linux/Unix: `libc::poll` over an array of `pollfd`.
//! - On Windows: `WSAPoll` over an array of `WSAPOLLFD`.
//!
//! [`PollFd`] is layout-compatible with the platform record so the socket
//! registry can hand its slice straight to the kernel without copying.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::transaction::Interest;

pub use platform::RawSocketHandle;

/// Native socket handle of a transaction, or [`NativeSocket::INVALID`]
/// while it is not connected.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeSocket(RawSocketHandle);

impl NativeSocket {
    /// Handle value meaning "no socket".
    pub const INVALID: NativeSocket = NativeSocket(platform::INVALID_SOCKET);

    /// Wrap a raw platform handle.
    pub const fn from_raw(raw: RawSocketHandle) -> Self {
        Self(raw)
    }

    /// Raw platform handle.
    pub const fn as_raw(self) -> RawSocketHandle {
        self.0
    }

    /// False for [`NativeSocket::INVALID`].
    pub fn is_valid(self) -> bool {
        self.0 != platform::INVALID_SOCKET
    }

    /// Handle of an open socket-like object.
    #[cfg(unix)]
    pub fn of(socket: &impl std::os::fd::AsRawFd) -> Self {
        Self(socket.as_raw_fd())
    }

    /// Handle of an open socket-like object.
    #[cfg(windows)]
    pub fn of(socket: &impl std::os::windows::io::AsRawSocket) -> Self {
        Self(socket.as_raw_socket() as RawSocketHandle)
    }
}

impl fmt::Debug for NativeSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "NativeSocket({})", self.0)
        } else {
            f.write_str("NativeSocket(INVALID)")
        }
    }
}

impl fmt::Display for NativeSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One entry of the readiness poll array.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct PollFd(platform::RawPollFd);

impl PollFd {
    /// Watch `socket` for `interest`.
    pub fn new(socket: NativeSocket, interest: Interest) -> Self {
        Self(platform::RawPollFd {
            fd: socket.0,
            events: platform::events_for(interest),
            revents: 0,
        })
    }

    /// Socket this entry watches.
    pub fn socket(&self) -> NativeSocket {
        NativeSocket(self.0.fd)
    }

    /// Replace the watched socket, keeping the interest.
    pub fn set_socket(&mut self, socket: NativeSocket) {
        self.0.fd = socket.0;
        self.0.revents = 0;
    }

    /// Readiness currently watched.
    pub fn interest(&self) -> Interest {
        if self.0.events == platform::events_for(Interest::Readable) {
            Interest::Readable
        } else {
            Interest::Writable
        }
    }

    /// Change the watched readiness.
    pub fn set_interest(&mut self, interest: Interest) {
        self.0.events = platform::events_for(interest);
    }

    /// True when the last poll reported the watched readiness, or a hangup
    /// or error that the driver has to observe.
    pub fn is_ready(&self) -> bool {
        self.0.revents & (self.0.events | platform::EVENTS_FAILURE) != 0
    }
}

impl fmt::Debug for PollFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollFd")
            .field("socket", &self.socket())
            .field("interest", &self.interest())
            .field("revents", &self.0.revents)
            .finish()
    }
}

/// Block until at least one entry is ready or `timeout` elapses.
///
/// Returns the number of ready entries. An interrupted call reports zero
/// ready entries rather than an error.
pub fn poll(fds: &mut [PollFd], timeout: Duration) -> io::Result<usize> {
    platform::poll(fds, timeout_ms(timeout))
}

/// Whole milliseconds for the poll call, rounded up so a non-zero timeout
/// never degrades into a non-blocking poll.
fn timeout_ms(timeout: Duration) -> i32 {
    timeout
        .as_nanos()
        .div_ceil(1_000_000)
        .try_into()
        .unwrap_or(i32::MAX)
}

#[cfg(unix)]
mod platform {
    use std::io;

    use super::PollFd;
    use crate::transaction::Interest;

    pub type RawSocketHandle = std::os::fd::RawFd;
    pub type RawPollFd = libc::pollfd;

    pub const INVALID_SOCKET: RawSocketHandle = -1;
    pub const EVENTS_FAILURE: libc::c_short = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;

    pub fn events_for(interest: Interest) -> libc::c_short {
        match interest {
            Interest::Readable => libc::POLLIN,
            Interest::Writable => libc::POLLOUT,
        }
    }

    pub fn poll(fds: &mut [PollFd], timeout_ms: i32) -> io::Result<usize> {
        for fd in fds.iter_mut() {
            fd.0.revents = 0;
        }
        // SAFETY: PollFd is repr(transparent) over libc::pollfd and the slice
        // stays mutably borrowed for the duration of the call.
        let res = unsafe {
            libc::poll(
                fds.as_mut_ptr().cast::<libc::pollfd>(),
                fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(res as usize)
    }
}

#[cfg(windows)]
mod platform {
    use std::io;

    use super::PollFd;
    use crate::transaction::Interest;

    pub type RawSocketHandle = usize;

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct RawPollFd {
        pub fd: RawSocketHandle,
        pub events: i16,
        pub revents: i16,
    }

    pub const INVALID_SOCKET: RawSocketHandle = !0;

    // Winsock2 poll flags
    const POLLRDNORM: i16 = 0x0100;
    const POLLRDBAND: i16 = 0x0200;
    const POLLWRNORM: i16 = 0x0010;
    const POLLERR: i16 = 0x0001;
    const POLLHUP: i16 = 0x0002;
    const POLLNVAL: i16 = 0x0004;
    const SOCKET_ERROR: i32 = -1;

    pub const EVENTS_FAILURE: i16 = POLLERR | POLLHUP | POLLNVAL;

    #[link(name = "ws2_32")]
    extern "system" {
        fn WSAPoll(fd_array: *mut RawPollFd, fds: u32, timeout: i32) -> i32;
        fn WSAGetLastError() -> i32;
    }

    pub fn events_for(interest: Interest) -> i16 {
        match interest {
            Interest::Readable => POLLRDNORM | POLLRDBAND,
            Interest::Writable => POLLWRNORM,
        }
    }

    pub fn poll(fds: &mut [PollFd], timeout_ms: i32) -> io::Result<usize> {
        for fd in fds.iter_mut() {
            fd.0.revents = 0;
        }
        // SAFETY: PollFd is repr(transparent) over WSAPOLLFD and the slice
        // stays mutably borrowed for the duration of the call.
        let res = unsafe { WSAPoll(fds.as_mut_ptr().cast::<RawPollFd>(), fds.len() as u32, timeout_ms) };
        if res == SOCKET_ERROR {
            // SAFETY: reads thread-local Winsock error state only.
            let code = unsafe { WSAGetLastError() };
            return Err(io::Error::from_raw_os_error(code));
        }
        Ok(res as usize)
    }
}
