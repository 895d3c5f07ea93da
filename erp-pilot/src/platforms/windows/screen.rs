use crate::platforms::ScreenSource;
use crate::types::{Point, ScreenshotResult};
use crate::AutomationError;

/// Captures the primary monitor through xcap
#[derive(Debug, Default)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }

    fn primary_monitor() -> Result<xcap::Monitor, AutomationError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get monitors: {e}")))?;
        for monitor in monitors {
            match monitor.is_primary() {
                Ok(true) => return Ok(monitor),
                Ok(false) => continue,
                Err(e) => {
                    return Err(AutomationError::PlatformError(format!(
                        "Error checking monitor primary status: {e}"
                    )));
                }
            }
        }
        Err(AutomationError::PlatformError(
            "Could not find primary monitor".to_string(),
        ))
    }
}

impl ScreenSource for XcapScreen {
    fn capture(&self) -> Result<ScreenshotResult, AutomationError> {
        let monitor = Self::primary_monitor()?;

        let x = monitor.x().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to get monitor position: {e}"))
        })?;
        let y = monitor.y().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to get monitor position: {e}"))
        })?;

        let image = monitor.capture_image().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to capture screen: {e}"))
        })?;

        Ok(ScreenshotResult::from_image(image, Point::new(x, y)))
    }
}
