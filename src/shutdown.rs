//! # Process termination signals.
//!
//! [`wait_for_shutdown_signal`] resolves with the name of the first termination
//! signal the process receives, so the caller can log it and shut its supervisors down.
//!
//! | Platform | Signals                         |
//! |----------|---------------------------------|
//! | Unix     | `SIGINT`, `SIGTERM`, `SIGQUIT`  |
//! | other    | Ctrl-C                          |

use std::io;

/// Waits for `SIGINT`, `SIGTERM` or `SIGQUIT` and returns its name.
///
/// # Errors
/// Returns the registration error if a signal handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for Ctrl-C.
///
/// # Errors
/// Returns the registration error if the handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
