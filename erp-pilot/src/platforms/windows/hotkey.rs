use crate::cancellation::CancellationMonitor;
use rdev::{EventType, Key};
use std::thread::{self, JoinHandle};
use tracing::{error, warn};

/// Listens for the Escape key on a dedicated thread and cancels `monitor`.
///
/// `rdev::listen` never returns while the hook is installed, so the thread
/// lives until the process exits.
pub fn spawn_escape_listener(monitor: CancellationMonitor) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(error) = rdev::listen(move |event: rdev::Event| {
            if let EventType::KeyPress(Key::Escape) = event.event_type {
                if !monitor.is_cancelled() {
                    warn!("Escape pressed, cancelling automation");
                    monitor.cancel();
                }
            }
        }) {
            error!("escape listener stopped: {:?}", error);
        }
    })
}
