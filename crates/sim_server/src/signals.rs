//! SIGINT/SIGTERM handling.
//!
//! Each armed [`SignalHandler`] owns a `sim-server-signals` thread running a
//! current-thread tokio runtime that waits for a signal or for the handler
//! to be dropped.

use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;
use tracing::{debug, info};

/// Calls a callback whenever the process receives an interrupt or
/// termination signal (Ctrl-C on non-unix platforms).
pub struct SignalHandler {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SignalHandler {
    /// Install the signal listeners and start the listener thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be built, the listeners
    /// cannot be registered, or the thread cannot be spawned.
    pub fn arm<F>(on_signal: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        #[cfg(unix)]
        let (mut interrupt, mut terminate) = {
            use tokio::signal::unix::{SignalKind, signal};
            let _guard = runtime.enter();
            (
                signal(SignalKind::interrupt())?,
                signal(SignalKind::terminate())?,
            )
        };

        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name("sim-server-signals".into())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        #[cfg(unix)]
                        let received = tokio::select! {
                            _ = interrupt.recv() => "SIGINT",
                            _ = terminate.recv() => "SIGTERM",
                            _ = &mut shutdown_rx => break,
                        };
                        #[cfg(not(unix))]
                        let received = tokio::select! {
                            result = tokio::signal::ctrl_c() => match result {
                                Ok(()) => "ctrl-c",
                                Err(_) => break,
                            },
                            _ = &mut shutdown_rx => break,
                        };
                        info!(signal = received, "signal received, stopping server");
                        on_signal();
                    }
                    debug!("signal listener shut down");
                });
            })?;

        Ok(Self {
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Whether the listener thread is alive.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_and_drop() {
        let handler = SignalHandler::arm(|| {}).unwrap();
        assert!(handler.initialized());
        drop(handler);
    }
}
