use crate::types::{Key, MouseButton, Point, ScreenshotResult, WindowHandle};
use crate::AutomationError;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of full-screen captures
pub trait ScreenSource: Send + Sync {
    /// Capture the primary display
    fn capture(&self) -> Result<ScreenshotResult, AutomationError>;
}

/// Top-level window management
pub trait WindowSystem: Send + Sync {
    /// Find a top-level window whose title is exactly `title`
    fn find_window(&self, title: &str) -> Result<Option<WindowHandle>, AutomationError>;

    fn is_minimized(&self, window: WindowHandle) -> Result<bool, AutomationError>;

    fn restore(&self, window: WindowHandle) -> Result<(), AutomationError>;

    fn maximize(&self, window: WindowHandle) -> Result<(), AutomationError>;

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), AutomationError>;

    /// Ask the shell to open an executable
    fn launch(&self, executable: &Path) -> Result<(), AutomationError>;
}

/// Synthetic mouse, keyboard and clipboard input
pub trait InputDevice: Send + Sync {
    /// Move the pointer to `to`, animated over `duration` (zero jumps)
    fn move_pointer(&self, to: Point, duration: Duration) -> Result<(), AutomationError>;

    /// Click at the current pointer position
    fn click(&self, button: MouseButton) -> Result<(), AutomationError>;

    fn press(&self, key: Key) -> Result<(), AutomationError>;

    /// Hold `keys` down in order, then release them in reverse
    fn chord(&self, keys: &[Key]) -> Result<(), AutomationError>;

    fn set_clipboard(&self, text: &str) -> Result<(), AutomationError>;
}

/// Time source for every settle delay and retry pause
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Everything the engine needs from the machine it runs on
#[derive(Clone)]
pub struct Desktop {
    pub screen: Arc<dyn ScreenSource>,
    pub windows: Arc<dyn WindowSystem>,
    pub input: Arc<dyn InputDevice>,
    pub clock: Arc<dyn Clock>,
}

#[cfg(target_os = "windows")]
pub mod windows;

/// Create the native desktop for the current platform
pub fn create_desktop() -> Result<Desktop, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Desktop {
            screen: Arc::new(windows::XcapScreen::new()),
            windows: Arc::new(windows::Win32Windows::new()),
            input: Arc::new(windows::RdevInput::new()),
            clock: Arc::new(SystemClock),
        })
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(AutomationError::UnsupportedPlatform(format!(
            "the host ERP client only runs on Windows, current platform is {}",
            std::env::consts::OS
        )))
    }
}
