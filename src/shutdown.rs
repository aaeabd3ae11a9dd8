//! Graceful shutdown flag
//!
//! SIGINT and SIGTERM set a single process-wide atomic; handlers do nothing
//! else, which keeps them async-signal-safe. Producer and consumer loops
//! poll the flag at their loop heads and all cleanup runs on the main
//! thread afterwards.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Relaxed is enough: the flag is monotonic (once true, never false).
pub fn requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

extern "C" fn handle_signal(_sig: i32) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub fn install_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as *const () as libc::sighandler_t);
    }
}
