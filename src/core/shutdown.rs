//! # Termination signals for [`Engine::wait_or_signal`](crate::Engine::wait_or_signal).
//!
//! [`termination_signal`] resolves with the name of the first termination signal the
//! process receives, so the engine can log which one triggered the kill.
//!
//! | Platform | Signals                        |
//! |----------|--------------------------------|
//! | unix     | `SIGINT`, `SIGTERM`, `SIGQUIT` |
//! | other    | Ctrl-C                         |
//!
//! Registration failure is returned as `Err`; the engine then waits without a signal.

use std::io;

/// Resolves with the received signal's name.
#[cfg(unix)]
pub(crate) async fn termination_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut listeners = [
        ("SIGINT", signal(SignalKind::interrupt())?),
        ("SIGTERM", signal(SignalKind::terminate())?),
        ("SIGQUIT", signal(SignalKind::quit())?),
    ];
    let [(int_name, int), (term_name, term), (quit_name, quit)] = &mut listeners;

    let name = tokio::select! {
        _ = int.recv() => *int_name,
        _ = term.recv() => *term_name,
        _ = quit.recv() => *quit_name,
    };
    Ok(name)
}

/// Resolves with the received signal's name.
#[cfg(not(unix))]
pub(crate) async fn termination_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
