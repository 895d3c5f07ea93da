//! Native Windows desktop: xcap capture, Win32 windows, rdev input

mod hotkey;
mod input;
mod screen;
mod window;

pub use hotkey::spawn_escape_listener;
pub use input::RdevInput;
pub use screen::XcapScreen;
pub use window::Win32Windows;
