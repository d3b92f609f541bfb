//! Cancellation watcher.
//!
//! Once the job has been read, the input stream is moved into a dedicated
//! thread. The parent cancels a running job by writing `exit` to that
//! stream; the watcher then ends the process on the spot. The main thread
//! never sees the stream again, so no locking is involved.
//!
//! Exactly one 4-byte read is attempted. A shorter stream, any other bytes
//! or a read error end the watcher quietly. Bytes after the first four are
//! never looked at.

use std::io::{self, Read};
use std::process;
use std::thread::{self, JoinHandle};
use strata_views_core::codes::CANCELLED_EXIT_STATUS;
use tracing::debug;

/// Bytes the parent writes to cancel a job.
pub const EXIT_SENTINEL: &[u8; 4] = b"exit";

/// Read one sentinel-sized chunk and report whether it is the sentinel.
pub fn read_sentinel<R: Read>(input: &mut R) -> bool {
    let mut buf = [0u8; 4];
    match input.read_exact(&mut buf) {
        Ok(()) => &buf == EXIT_SENTINEL,
        Err(_) => false,
    }
}

/// Handle to a running watcher thread.
#[derive(Debug)]
pub struct CancellationWatcher {
    handle: JoinHandle<bool>,
}

impl CancellationWatcher {
    /// Start watching `input`, exiting the process with
    /// [`CANCELLED_EXIT_STATUS`] when the sentinel arrives.
    pub fn spawn<R>(input: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::spawn_with(input, || process::exit(CANCELLED_EXIT_STATUS))
    }

    /// Start watching `input`, running `on_exit` when the sentinel arrives.
    pub fn spawn_with<R, F>(mut input: R, on_exit: F) -> io::Result<Self>
    where
        R: Read + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("exit-watcher".to_string())
            .spawn(move || {
                if read_sentinel(&mut input) {
                    debug!("Exit sentinel received");
                    on_exit();
                    true
                } else {
                    false
                }
            })?;
        Ok(CancellationWatcher { handle })
    }

    /// Wait for the watcher and report whether it saw the sentinel.
    ///
    /// Blocks until the input yields four bytes or ends, so only call this
    /// when the input is known to be finite.
    pub fn join(self) -> bool {
        self.handle.join().unwrap_or(false)
    }
}
