//! Window activation and client launch

use crate::platforms::{Clock, WindowSystem};
use crate::types::WindowHandle;
use crate::AutomationError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Brings named top-level windows to the front
#[derive(Clone)]
pub struct WindowController {
    windows: Arc<dyn WindowSystem>,
    clock: Arc<dyn Clock>,
}

impl WindowController {
    pub fn new(windows: Arc<dyn WindowSystem>, clock: Arc<dyn Clock>) -> Self {
        Self { windows, clock }
    }

    /// Wait up to `timeout` for a window titled exactly `title`, then restore
    /// it if minimized, maximize it and give it focus.
    ///
    /// Looks at least once even with a zero timeout. Platform failures are
    /// logged and reported as `false`.
    pub fn activate(&self, title: &str, timeout: Duration) -> bool {
        let start = self.clock.now();
        loop {
            match self.windows.find_window(title) {
                Ok(Some(window)) => {
                    return match self.bring_up(window) {
                        Ok(()) => {
                            info!("window '{}' activated", title);
                            true
                        }
                        Err(e) => {
                            error!("failed to activate window '{}': {}", title, e);
                            false
                        }
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    error!("error while looking for window '{}': {}", title, e);
                    return false;
                }
            }

            self.clock.sleep(POLL_INTERVAL);
            if self.clock.now().duration_since(start) >= timeout {
                break;
            }
        }

        warn!("window '{}' not found within {:?}", title, timeout);
        false
    }

    fn bring_up(&self, window: WindowHandle) -> Result<(), AutomationError> {
        if self.windows.is_minimized(window)? {
            debug!("window {:?} is minimized, restoring", window);
            self.windows.restore(window)?;
            self.clock.sleep(SETTLE_DELAY);
        }

        self.windows.maximize(window)?;
        self.clock.sleep(SETTLE_DELAY);

        self.windows.bring_to_foreground(window)?;
        self.clock.sleep(SETTLE_DELAY);
        Ok(())
    }

    pub fn launch(&self, executable: &Path) -> Result<(), AutomationError> {
        info!("launching {}", executable.display());
        self.windows.launch(executable)
    }
}
