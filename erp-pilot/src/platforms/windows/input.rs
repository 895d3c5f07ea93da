use crate::platforms::InputDevice;
use crate::types::{Key, MouseButton, Point};
use crate::AutomationError;
use arboard::Clipboard;
use rdev::{Button, EventType};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::debug;

// the OS drops synthetic events that arrive back to back
const EVENT_GAP: Duration = Duration::from_millis(20);
const MOVE_STEP: Duration = Duration::from_millis(10);

/// Mouse and keyboard through `rdev::simulate`, clipboard through arboard
#[derive(Debug, Default)]
pub struct RdevInput {
    last_position: Mutex<Option<(f64, f64)>>,
}

impl RdevInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(event: &EventType) -> Result<(), AutomationError> {
        rdev::simulate(event).map_err(|e| {
            AutomationError::PlatformError(format!("failed to simulate {event:?}: {e:?}"))
        })?;
        thread::sleep(EVENT_GAP);
        Ok(())
    }

    fn position(&self) -> Option<(f64, f64)> {
        *self.last_position.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remember(&self, x: f64, y: f64) {
        *self.last_position.lock().unwrap_or_else(|e| e.into_inner()) = Some((x, y));
    }
}

fn rdev_key(key: Key) -> Result<rdev::Key, AutomationError> {
    let mapped = match key {
        Key::Control => rdev::Key::ControlLeft,
        Key::Alt => rdev::Key::Alt,
        Key::Space => rdev::Key::Space,
        Key::Enter => rdev::Key::Return,
        Key::Escape => rdev::Key::Escape,
        Key::Letter(c) => match c.to_ascii_lowercase() {
            'a' => rdev::Key::KeyA,
            'b' => rdev::Key::KeyB,
            'c' => rdev::Key::KeyC,
            'd' => rdev::Key::KeyD,
            'e' => rdev::Key::KeyE,
            'f' => rdev::Key::KeyF,
            'g' => rdev::Key::KeyG,
            'h' => rdev::Key::KeyH,
            'i' => rdev::Key::KeyI,
            'j' => rdev::Key::KeyJ,
            'k' => rdev::Key::KeyK,
            'l' => rdev::Key::KeyL,
            'm' => rdev::Key::KeyM,
            'n' => rdev::Key::KeyN,
            'o' => rdev::Key::KeyO,
            'p' => rdev::Key::KeyP,
            'q' => rdev::Key::KeyQ,
            'r' => rdev::Key::KeyR,
            's' => rdev::Key::KeyS,
            't' => rdev::Key::KeyT,
            'u' => rdev::Key::KeyU,
            'v' => rdev::Key::KeyV,
            'w' => rdev::Key::KeyW,
            'x' => rdev::Key::KeyX,
            'y' => rdev::Key::KeyY,
            'z' => rdev::Key::KeyZ,
            other => {
                return Err(AutomationError::PlatformError(format!(
                    "unsupported key: {other}"
                )))
            }
        },
    };
    Ok(mapped)
}

impl InputDevice for RdevInput {
    fn move_pointer(&self, to: Point, duration: Duration) -> Result<(), AutomationError> {
        let (tx, ty) = (f64::from(to.x), f64::from(to.y));
        let steps = (duration.as_millis() / MOVE_STEP.as_millis()).max(1) as u32;

        match self.position() {
            Some((sx, sy)) if steps > 1 => {
                for i in 1..=steps {
                    let t = f64::from(i) / f64::from(steps);
                    let x = sx + (tx - sx) * t;
                    let y = sy + (ty - sy) * t;
                    rdev::simulate(&EventType::MouseMove { x, y }).map_err(|e| {
                        AutomationError::PlatformError(format!("failed to move pointer: {e:?}"))
                    })?;
                    thread::sleep(MOVE_STEP);
                }
            }
            _ => Self::send(&EventType::MouseMove { x: tx, y: ty })?,
        }

        self.remember(tx, ty);
        debug!("pointer at {to}");
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<(), AutomationError> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        Self::send(&EventType::ButtonPress(button))?;
        Self::send(&EventType::ButtonRelease(button))
    }

    fn press(&self, key: Key) -> Result<(), AutomationError> {
        let key = rdev_key(key)?;
        Self::send(&EventType::KeyPress(key))?;
        Self::send(&EventType::KeyRelease(key))
    }

    fn chord(&self, keys: &[Key]) -> Result<(), AutomationError> {
        let keys = keys
            .iter()
            .map(|key| rdev_key(*key))
            .collect::<Result<Vec<_>, _>>()?;
        for key in &keys {
            Self::send(&EventType::KeyPress(*key))?;
        }
        for key in keys.iter().rev() {
            Self::send(&EventType::KeyRelease(*key))?;
        }
        Ok(())
    }

    fn set_clipboard(&self, text: &str) -> Result<(), AutomationError> {
        let mut clipboard = Clipboard::new().map_err(|e| {
            AutomationError::PlatformError(format!("failed to open clipboard: {e}"))
        })?;
        clipboard.set_text(text.to_owned()).map_err(|e| {
            AutomationError::PlatformError(format!("failed to set clipboard text: {e}"))
        })
    }
}
