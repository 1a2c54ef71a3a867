//! Cooperative shutdown signalling.
//!
//! SIGINT and SIGTERM raise a single atomic flag; every bounded wait in the
//! accept and receive loops re-checks it. The signal handler performs one
//! atomic store and nothing else; logging and cleanup happen on the main
//! thread once the flag is observed.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Clonable handle to a shutdown flag.
///
/// The flag starts lowered, is raised at most once, and is never reset.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request shutdown. A single atomic store, safe from signal context.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static SIGNAL_FLAG: OnceLock<ShutdownFlag> = OnceLock::new();

extern "C" fn on_signal(_sig: libc::c_int) {
    if let Some(flag) = SIGNAL_FLAG.get() {
        flag.raise();
    }
}

/// Install SIGINT/SIGTERM handlers that raise `flag`.
///
/// Handlers can be installed once per process; a second call fails.
pub fn install(flag: &ShutdownFlag) -> io::Result<()> {
    SIGNAL_FLAG.set(flag.clone()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "signal handlers already installed",
        )
    })?;

    for sig in [libc::SIGINT, libc::SIGTERM] {
        let prev = unsafe { libc::signal(sig, on_signal as libc::sighandler_t) };
        if prev == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_lowered() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_raised());
    }

    #[test]
    fn test_raise_is_visible_through_clones() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();

        flag.raise();
        assert!(observer.is_raised());
    }
}
