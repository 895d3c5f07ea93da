use crate::platforms::WindowSystem;
use crate::types::WindowHandle;
use crate::AutomationError;
use std::path::Path;
use tracing::debug;
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Shell::ShellExecuteW;
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowW, IsIconic, SetForegroundWindow, ShowWindow, SW_MAXIMIZE, SW_RESTORE,
    SW_SHOWNORMAL,
};

/// Top-level window control through the Win32 API
#[derive(Debug, Default)]
pub struct Win32Windows;

impl Win32Windows {
    pub fn new() -> Self {
        Self
    }
}

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut std::ffi::c_void)
}

impl WindowSystem for Win32Windows {
    fn find_window(&self, title: &str) -> Result<Option<WindowHandle>, AutomationError> {
        let title_hstring = HSTRING::from(title);
        // FindWindowW reports "no such window" as an error, which is not one here
        let found = unsafe { FindWindowW(PCWSTR::null(), PCWSTR(title_hstring.as_ptr())) };
        match found {
            Ok(handle) if !handle.is_invalid() => Ok(Some(WindowHandle(handle.0 as isize))),
            _ => Ok(None),
        }
    }

    fn is_minimized(&self, window: WindowHandle) -> Result<bool, AutomationError> {
        Ok(unsafe { IsIconic(hwnd(window)) }.as_bool())
    }

    fn restore(&self, window: WindowHandle) -> Result<(), AutomationError> {
        let result = unsafe { ShowWindow(hwnd(window), SW_RESTORE) };
        debug!("ShowWindow(SW_RESTORE) returned {}", result.as_bool());
        Ok(())
    }

    fn maximize(&self, window: WindowHandle) -> Result<(), AutomationError> {
        let result = unsafe { ShowWindow(hwnd(window), SW_MAXIMIZE) };
        if !result.as_bool() {
            debug!("Window was already maximized or maximize operation had no effect");
        }
        Ok(())
    }

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), AutomationError> {
        let result = unsafe { SetForegroundWindow(hwnd(window)) };
        if !result.as_bool() {
            return Err(AutomationError::PlatformError(
                "SetForegroundWindow refused to activate the window".to_string(),
            ));
        }
        Ok(())
    }

    fn launch(&self, executable: &Path) -> Result<(), AutomationError> {
        let target = HSTRING::from(executable.as_os_str());
        let verb = HSTRING::from("open");
        let result = unsafe {
            ShellExecuteW(
                None,
                PCWSTR(verb.as_ptr()),
                PCWSTR(target.as_ptr()),
                PCWSTR::null(),
                PCWSTR::null(),
                SW_SHOWNORMAL,
            )
        };
        // A value > 32 indicates success for ShellExecuteW
        if result.0 as isize <= 32 {
            return Err(AutomationError::PlatformError(format!(
                "Failed to launch {}. ShellExecuteW returned error code: {:?}",
                executable.display(),
                result.0 as isize
            )));
        }
        Ok(())
    }
}
