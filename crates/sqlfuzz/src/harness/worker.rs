//! Forked worker processes
//!
//! A worker is a child created with `fork(2)` that runs a closure and never
//! returns into the caller's code. The supervisor keeps a [`WorkerHandle`]
//! and waits for the child to terminate, optionally killing it after a
//! deadline.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{Error, Result};

/// Exit code of a worker whose body panicked.
pub const PANIC_EXIT_CODE: i32 = 101;

/// How often a bounded wait polls the child.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitReason {
    /// Called `exit` (or returned from its body) with this code
    Exited(i32),
    /// Killed by this signal
    Signaled(i32),
    /// Outlived the wait deadline and was killed by the supervisor
    TimedOut,
}

impl ExitReason {
    /// Whether the worker ended any way other than a clean `exit(0)`.
    pub fn is_failure(&self) -> bool {
        !matches!(self, ExitReason::Exited(0))
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Exited(code) => write!(f, "exited with code {}", code),
            ExitReason::Signaled(signal) => write!(f, "killed by signal {}", signal),
            ExitReason::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Entry point for creating workers.
pub struct Worker;

impl Worker {
    /// Fork a child that runs `body` and then exits.
    ///
    /// The child exits with `0` when `body` returns and with
    /// [`PANIC_EXIT_CODE`] when it panics. It never unwinds back into the
    /// caller. Only the thread calling `spawn` exists in the child, so
    /// `body` must not wait on locks other threads may hold (logging
    /// subscribers included).
    pub fn spawn<F: FnOnce()>(body: F) -> Result<WorkerHandle> {
        // SAFETY: fork has no memory-safety preconditions of its own. The
        // child only runs `body` and then `_exit`s, never returning into
        // code that assumes the parent's threads exist.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(Error::Fork(io::Error::last_os_error()));
        }
        if pid == 0 {
            let code = match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(()) => 0,
                Err(_) => PANIC_EXIT_CODE,
            };
            // SAFETY: _exit skips atexit handlers and stdio flushing, which
            // belong to the parent.
            unsafe { libc::_exit(code) }
        }
        Ok(WorkerHandle { pid, exit: None })
    }
}

/// Supervisor's handle on a live or finished worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: libc::pid_t,
    exit: Option<ExitReason>,
}

impl WorkerHandle {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Block until the worker terminates.
    ///
    /// With `timeout = None` this waits indefinitely. Otherwise a worker
    /// still running at the deadline is killed with `SIGKILL`, reaped, and
    /// reported as [`ExitReason::TimedOut`]. Waiting on a finished worker
    /// returns the same reason again.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<ExitReason> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let Some(limit) = timeout else {
            return self.wait_blocking();
        };

        let deadline = Instant::now() + limit;
        loop {
            if let Some(exit) = self.try_wait()? {
                return Ok(exit);
            }
            let now = Instant::now();
            if now >= deadline {
                self.kill();
                self.wait_blocking()?;
                self.exit = Some(ExitReason::TimedOut);
                return Ok(ExitReason::TimedOut);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Reap the worker if it has already terminated.
    pub fn try_wait(&mut self) -> Result<Option<ExitReason>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        self.waitpid(libc::WNOHANG)
    }

    /// Send `SIGKILL` to a worker that has not been reaped yet.
    pub fn kill(&mut self) {
        if self.exit.is_none() {
            // SAFETY: the pid belongs to our unreaped child, so it cannot
            // have been recycled for another process.
            unsafe {
                libc::kill(self.pid, libc::SIGKILL);
            }
        }
    }

    fn wait_blocking(&mut self) -> Result<ExitReason> {
        match self.waitpid(0)? {
            Some(exit) => Ok(exit),
            None => Err(Error::Wait(io::Error::other("worker still running"))),
        }
    }

    fn waitpid(&mut self, flags: libc::c_int) -> Result<Option<ExitReason>> {
        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: status is a valid out pointer for the duration of the call.
            let rc = unsafe { libc::waitpid(self.pid, &mut status, flags) };
            if rc == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Wait(err));
            }
            if rc == 0 {
                return Ok(None);
            }
            let exit = decode_status(status);
            self.exit = Some(exit);
            return Ok(Some(exit));
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.exit.is_none() {
            self.kill();
            let _ = self.waitpid(0);
        }
    }
}

fn decode_status(status: libc::c_int) -> ExitReason {
    if libc::WIFSIGNALED(status) {
        ExitReason::Signaled(libc::WTERMSIG(status))
    } else {
        ExitReason::Exited(libc::WEXITSTATUS(status))
    }
}
