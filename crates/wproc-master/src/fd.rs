//! Raw-fd I/O helpers.
//!
//! Worker sockets are plain stream-socket fds owned by their handles;
//! the broker multiplexes them but never reads or writes. These helpers
//! do the actual syscalls.

use std::io::{self, Read};
use std::os::unix::io::RawFd;

/// `io::Read` over a borrowed raw fd, for feeding the read cache.
pub struct FdReader(pub RawFd);

impl Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = unsafe { libc::read(self.0, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

/// Write the whole buffer, retrying short writes and EINTR. Returns the
/// errno on failure. The master never waits on a worker, so a socket
/// that cannot take the message right now is a failure, not a stall.
pub fn write_all(fd: RawFd, mut buf: &[u8]) -> Result<(), i32> {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err.raw_os_error().unwrap_or(libc::EIO));
        }
        buf = &buf[n as usize..];
    }
    Ok(())
}
