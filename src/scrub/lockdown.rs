//! Stream Lockdown
//!
//! Atomically reroutes process stdout and stderr through scrubbers. Each
//! redirected stream gets an OS pipe whose write end replaces the original
//! fd; a background copier drains the read end into a scrubber that sinks
//! to a duplicate of the original stream. `restore` is idempotent: it
//! reinstates the original fds, joins the copiers, and flushes whatever
//! was in flight.

use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::scrub::provider::SecretProvider;
use crate::scrub::scrubber::StreamScrubber;
use crate::scrub::ScrubError;

const COPY_BUF_SIZE: usize = 8192;

fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

struct RedirectedStream {
    /// The fd we replaced (1 or 2).
    fd: libc::c_int,
    /// Duplicate of the original stream, for restoration.
    saved_fd: libc::c_int,
    scrubber: Arc<StreamScrubber>,
    copier: Option<JoinHandle<()>>,
}

pub struct LockdownGuard {
    restored: AtomicBool,
    streams: Vec<RedirectedStream>,
}

/// Reroute stdout and stderr through scrubbers. The factory is called once
/// per stream; each copier owns its provider.
pub fn lockdown_streams<F>(mut make_provider: F) -> Result<LockdownGuard, ScrubError>
where
    F: FnMut() -> Box<dyn SecretProvider>,
{
    let mut streams = Vec::with_capacity(2);
    for fd in [libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        streams.push(redirect_fd(fd, make_provider())?);
    }
    Ok(LockdownGuard { restored: AtomicBool::new(false), streams })
}

fn redirect_fd(
    fd: libc::c_int,
    provider: Box<dyn SecretProvider>,
) -> Result<RedirectedStream, ScrubError> {
    let saved_fd = unsafe { check(libc::dup(fd))? };
    let mut pipe_fds = [0 as libc::c_int; 2];
    unsafe { check(libc::pipe(pipe_fds.as_mut_ptr()))? };
    let (read_fd, write_fd) = (pipe_fds[0], pipe_fds[1]);

    // The scrubber sinks to its own duplicate of the original stream, so
    // its writes bypass the pipe we are about to splice in.
    let sink_fd = unsafe { check(libc::dup(saved_fd))? };
    let sink = unsafe { File::from_raw_fd(sink_fd) };
    let scrubber = Arc::new(StreamScrubber::new(sink).with_secret_provider(provider));

    unsafe {
        check(libc::dup2(write_fd, fd))?;
        check(libc::close(write_fd))?;
    }

    let copier = Some(spawn_copier(read_fd, scrubber.clone()));
    Ok(RedirectedStream { fd, saved_fd, scrubber, copier })
}

/// Drain a pipe read end into a scrubber until EOF, then close both.
fn spawn_copier(read_fd: libc::c_int, scrubber: Arc<StreamScrubber>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buf = [0u8; COPY_BUF_SIZE];
        loop {
            let n = unsafe {
                libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n <= 0 {
                break;
            }
            if scrubber.write(&buf[..n as usize]).is_err() {
                break;
            }
        }
        unsafe {
            libc::close(read_fd);
        }
        let _ = scrubber.close();
    })
}

impl LockdownGuard {
    /// Restore the original streams. Closing our last handle on each pipe
    /// write end EOFs the copier, which is then joined; data in flight is
    /// flushed before the originals are back in place. Safe to call more
    /// than once.
    pub fn restore(&mut self) -> Result<(), ScrubError> {
        if self.restored.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for stream in &mut self.streams {
            unsafe {
                // Reinstating the saved fd drops the pipe write end that
                // was occupying it, which EOFs the reader.
                check(libc::dup2(stream.saved_fd, stream.fd)).map_err(ScrubError::Io)?;
                check(libc::close(stream.saved_fd)).map_err(ScrubError::Io)?;
            }
            if let Some(copier) = stream.copier.take() {
                let _ = copier.join();
            }
            // The copier closed the scrubber at EOF; this is a no-op
            // unless the copier died early.
            stream.scrubber.close()?;
        }
        Ok(())
    }
}

impl Drop for LockdownGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
