//! Timestamped screenshots taken around every UI action

use crate::platforms::ScreenSource;
use crate::AutomationError;
use chrono::{DateTime, Local};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AuditTrail {
    dir: Option<PathBuf>,
    screen: Arc<dyn ScreenSource>,
}

impl AuditTrail {
    /// Screenshots are written to `dir`, created if missing.
    pub fn new(dir: impl Into<PathBuf>, screen: Arc<dyn ScreenSource>) -> Result<Self, AutomationError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: Some(dir),
            screen,
        })
    }

    /// A trail that records nothing
    pub fn disabled(screen: Arc<dyn ScreenSource>) -> Self {
        Self { dir: None, screen }
    }

    /// Capture the screen as `<timestamp>_<name>.png`.
    ///
    /// Failures are logged and never interrupt the workflow.
    pub fn capture(&self, name: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        match self.write(dir, name) {
            Ok(path) => {
                debug!("saved screenshot {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("failed to save screenshot '{}': {}", name, e);
                None
            }
        }
    }

    fn write(&self, dir: &Path, name: &str) -> Result<PathBuf, AutomationError> {
        let shot = self.screen.capture()?;
        let image = shot.to_image().ok_or_else(|| {
            AutomationError::PlatformError("screenshot buffer is truncated".to_string())
        })?;
        let path = dir.join(screenshot_file_name(Local::now(), name));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| AutomationError::PlatformError(format!("failed to write png: {e}")))?;
        Ok(path)
    }
}

/// `20240501_101010_123_click_save.png`
pub fn screenshot_file_name(at: DateTime<Local>, name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}.png", at.format("%Y%m%d_%H%M%S_%3f"), name)
}
