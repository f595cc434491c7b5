//! Ctrl-C handling.
//!
//! The signal only sets a flag. The pipeline checks it between steps and the
//! build loop polls it, so an interrupt stops the run at the next boundary
//! and never leaves a half-written destination behind.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the SIGINT handler and return the flag it sets.
///
/// Installing more than once is harmless.
pub fn install_handler() -> &'static AtomicBool {
    register();
    &INTERRUPTED
}

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn register() {
    let handler: extern "C" fn(libc::c_int) = on_sigint;
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!("could not install interrupt handler; Ctrl-C will stop the installer abruptly");
    }
}

#[cfg(not(unix))]
fn register() {
    log::debug!("interrupt handling is not supported on this platform");
}
