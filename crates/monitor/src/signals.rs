//! Process termination requests
//!
//! Ctrl-C everywhere, plus SIGTERM on Unix (`systemctl stop`, `docker stop`).

use std::io;

/// Handlers are registered in [`TerminationListener::install`], so a
/// request arriving before the first `recv` is not lost.
pub struct TerminationListener {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationListener {
    /// Register the signal handlers; must be called inside a tokio runtime
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Wait for the next termination request; returns its name
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        #[cfg(unix)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result.map(|_| "Ctrl-C"),
                _ = self.terminate.recv() => Ok("SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
        }
    }
}
