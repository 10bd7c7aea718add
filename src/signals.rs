//! Ignoring interactive signals while session-manager-plugin owns the terminal.
//!
//! Ctrl-C, Ctrl-\ and Ctrl-Z belong to the remote shell during a session. The
//! proxy ignores them for as long as an [`IgnoredSignals`] guard is alive, and
//! puts the previous dispositions back when the guard is dropped.

use libc::{c_int, sighandler_t};

use crate::error::{ProxyError, Result};

#[cfg(unix)]
pub const INTERACTIVE_SIGNALS: &[c_int] = &[libc::SIGINT, libc::SIGQUIT, libc::SIGTSTP];

#[cfg(not(unix))]
pub const INTERACTIVE_SIGNALS: &[c_int] = &[libc::SIGINT];

#[derive(Debug)]
pub struct IgnoredSignals {
    previous: Vec<(c_int, sighandler_t)>,
}

impl IgnoredSignals {
    pub fn acquire() -> Result<Self> {
        let mut guard = Self {
            previous: Vec::with_capacity(INTERACTIVE_SIGNALS.len()),
        };

        for &signal in INTERACTIVE_SIGNALS {
            let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
            if previous == libc::SIG_ERR {
                // Dropping the guard restores whatever was changed so far.
                return Err(ProxyError::Transport(format!(
                    "failed to ignore signal {}",
                    signal
                )));
            }
            guard.previous.push((signal, previous));
        }

        Ok(guard)
    }
}

impl Drop for IgnoredSignals {
    fn drop(&mut self) {
        for (signal, handler) in self.previous.drain(..).rev() {
            unsafe {
                libc::signal(signal, handler);
            }
        }
    }
}

/// Resets the interactive signals to their default action.
///
/// Runs in the forked child before exec, so it only makes async-signal-safe calls.
#[cfg(unix)]
pub fn reset_to_default() -> std::io::Result<()> {
    for &signal in INTERACTIVE_SIGNALS {
        if unsafe { libc::signal(signal, libc::SIG_DFL) } == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Serializes tests that change process-wide signal dispositions.
#[cfg(test)]
pub static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Current disposition of `signal`, read by setting and restoring it.
#[cfg(all(test, unix))]
pub fn current_handler(signal: c_int) -> sighandler_t {
    unsafe {
        let handler = libc::signal(signal, libc::SIG_IGN);
        libc::signal(signal, handler);
        handler
    }
}
