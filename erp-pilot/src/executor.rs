//! Locate-then-act steps with retry, window activation and audit capture

use crate::audit::AuditTrail;
use crate::cancellation::CancellationMonitor;
use crate::config::EngineConfig;
use crate::matcher::{ScreenMatcher, TemplateLocator, DEFAULT_MATCH_THRESHOLD};
use crate::platforms::Desktop;
use crate::templates::{TemplateRef, TemplateStore};
use crate::types::{Key, MatchResult, MouseButton, Point};
use crate::window::WindowController;
use crate::AutomationError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub const MAX_RETRIES: usize = 5;
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const POINTER_TRAVEL: Duration = Duration::from_millis(500);
pub const CLICK_SETTLE: Duration = Duration::from_millis(500);
pub const WINDOW_TIMEOUT: Duration = Duration::from_secs(1);

/// How hard a step tries before giving up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Locate attempts per step, always at least one
    pub max_retries: usize,
    /// Pause between failed attempts
    pub retry_interval: Duration,
    pub match_threshold: f32,
    pub pointer_travel: Duration,
    pub click_settle: Duration,
    pub window_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_interval: RETRY_INTERVAL,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            pointer_travel: POINTER_TRAVEL,
            click_settle: CLICK_SETTLE,
            window_timeout: WINDOW_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_interval: config.retry_interval,
            match_threshold: config.match_threshold,
            window_timeout: config.erp.activate_timeout,
            ..Self::default()
        }
    }
}

/// One locate-and-optionally-click action
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub template: TemplateRef,
    /// Window to bring to the front first
    pub window_title: Option<String>,
    pub click: bool,
    /// Overrides the engine threshold
    pub confidence: Option<f32>,
}

impl Step {
    pub fn click(name: impl Into<String>, template: impl Into<TemplateRef>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            window_title: None,
            click: true,
            confidence: None,
        }
    }

    pub fn locate(name: impl Into<String>, template: impl Into<TemplateRef>) -> Self {
        Self {
            click: false,
            ..Self::click(name, template)
        }
    }

    pub fn in_window(mut self, title: impl Into<String>) -> Self {
        self.window_title = Some(title.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// What a step ended with. Only `Located` and `Clicked` count as success.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionOutcome {
    Located(MatchResult),
    Clicked(MatchResult),
    NotFound,
    WindowNotFound,
    Cancelled,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Located(_) | ActionOutcome::Clicked(_))
    }

    /// The match that made the step succeed
    pub fn found(&self) -> Option<MatchResult> {
        match self {
            ActionOutcome::Located(m) | ActionOutcome::Clicked(m) => Some(*m),
            _ => None,
        }
    }
}

/// Runs steps against the desktop.
///
/// All waiting goes through the desktop clock and all input through the
/// desktop input device, so a mocked [`Desktop`] runs instantly.
pub struct ActionExecutor {
    desktop: Desktop,
    templates: Arc<TemplateStore>,
    locator: Arc<dyn TemplateLocator>,
    windows: WindowController,
    audit: AuditTrail,
    cancellation: CancellationMonitor,
    policy: RetryPolicy,
}

impl ActionExecutor {
    pub fn new(
        desktop: Desktop,
        templates: Arc<TemplateStore>,
        locator: Arc<dyn TemplateLocator>,
        audit: AuditTrail,
        cancellation: CancellationMonitor,
        policy: RetryPolicy,
    ) -> Self {
        let windows = WindowController::new(desktop.windows.clone(), desktop.clock.clone());
        Self {
            desktop,
            templates,
            locator,
            windows,
            audit,
            cancellation,
            policy,
        }
    }

    /// Executor matching against live screen captures
    pub fn from_config(
        config: &EngineConfig,
        desktop: Desktop,
        cancellation: CancellationMonitor,
    ) -> Result<Self, AutomationError> {
        let templates = Arc::new(TemplateStore::open(&config.template_dir)?);
        let locator = Arc::new(ScreenMatcher::new(desktop.screen.clone(), templates.clone()));
        let audit = match &config.screenshot_dir {
            Some(dir) => AuditTrail::new(dir, desktop.screen.clone())?,
            None => AuditTrail::disabled(desktop.screen.clone()),
        };
        Ok(Self::new(
            desktop,
            templates,
            locator,
            audit,
            cancellation,
            RetryPolicy::from_config(config),
        ))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// `Err(Cancelled)` once a stop was requested
    pub fn ensure_active(&self) -> Result<(), AutomationError> {
        self.cancellation.check()
    }

    /// Run one step: activate its window, locate its template with retries,
    /// click the match center if asked.
    ///
    /// `Err` is reserved for platform and asset failures; an absent template
    /// or window is an `Ok` outcome.
    #[instrument(level = "debug", skip(self), fields(step = %step.name))]
    pub fn execute(&self, step: &Step) -> Result<ActionOutcome, AutomationError> {
        if self.is_cancelled() {
            warn!("cancellation requested, skipping '{}'", step.name);
            return Ok(ActionOutcome::Cancelled);
        }

        if let Some(title) = &step.window_title {
            if !self.windows.activate(title, self.policy.window_timeout) {
                error!("'{}' needs window '{}' which is not available", step.name, title);
                return Ok(ActionOutcome::WindowNotFound);
            }
        }

        let path = self.templates.resolve(&step.template);
        let label = step.template.label();
        let threshold = step.confidence.unwrap_or(self.policy.match_threshold);
        let attempts = self.policy.max_retries.max(1);

        for attempt in 1..=attempts {
            if let Some(found) = self.locator.locate(&path, threshold)? {
                return if step.click {
                    self.audit.capture(&format!("click_{label}"));
                    self.click_match(found)?;
                    self.audit.capture(&format!("after_click_{label}"));
                    info!("clicked {} at {}", step.template, found.point());
                    Ok(ActionOutcome::Clicked(found))
                } else {
                    self.audit.capture(&format!("locate_{label}"));
                    info!(
                        "located {} at {} ({:.3})",
                        step.template,
                        found.point(),
                        found.confidence
                    );
                    Ok(ActionOutcome::Located(found))
                };
            }

            if attempt < attempts {
                debug!(
                    "{} not found, retrying ({}/{})",
                    step.template, attempt, attempts
                );
                self.desktop.clock.sleep(self.policy.retry_interval);
            }
        }

        error!("could not find {} after {} attempts", step.template, attempts);
        self.audit.capture(&format!("locate_failed_{label}"));
        Ok(ActionOutcome::NotFound)
    }

    /// Run a step that must succeed.
    ///
    /// Cancellation surfaces as `Cancelled`, any other miss as `StepFailed`.
    pub fn require(&self, step: &Step) -> Result<MatchResult, AutomationError> {
        match self.execute(step)? {
            ActionOutcome::Located(found) | ActionOutcome::Clicked(found) => Ok(found),
            ActionOutcome::Cancelled => Err(AutomationError::Cancelled),
            ActionOutcome::NotFound | ActionOutcome::WindowNotFound => {
                Err(AutomationError::step(step.name.clone()))
            }
        }
    }

    /// Convenience form of [`execute`](Self::execute) for ad-hoc lookups
    pub fn locate_and_click(
        &self,
        template: impl Into<TemplateRef>,
        window_title: Option<&str>,
        confidence: Option<f32>,
        click: bool,
    ) -> Result<ActionOutcome, AutomationError> {
        let template = template.into();
        let step = Step {
            name: template.label(),
            template,
            window_title: window_title.map(str::to_string),
            click,
            confidence,
        };
        self.execute(&step)
    }

    /// Single locate attempt with no retry, audit or window handling
    pub fn probe(
        &self,
        template: impl Into<TemplateRef>,
    ) -> Result<Option<MatchResult>, AutomationError> {
        let path = self.templates.resolve(&template.into());
        self.locator.locate(&path, self.policy.match_threshold)
    }

    fn click_match(&self, found: MatchResult) -> Result<(), AutomationError> {
        self.desktop
            .input
            .move_pointer(found.point(), self.policy.pointer_travel)?;
        self.desktop.input.click(MouseButton::Left)?;
        self.desktop.clock.sleep(self.policy.click_settle);
        Ok(())
    }

    /// Click a fixed point
    pub fn click_at(&self, point: Point, button: MouseButton) -> Result<(), AutomationError> {
        debug!("{:?} click at {}", button, point);
        self.desktop.input.move_pointer(point, Duration::ZERO)?;
        self.desktop.input.click(button)
    }

    pub fn set_clipboard(&self, text: &str) -> Result<(), AutomationError> {
        self.desktop.input.set_clipboard(text)
    }

    /// Put `text` on the clipboard and paste it into the focused control
    pub fn paste_text(&self, text: &str) -> Result<(), AutomationError> {
        self.set_clipboard(text)?;
        self.chord(&[Key::Control, Key::Letter('v')])
    }

    pub fn press(&self, key: Key) -> Result<(), AutomationError> {
        debug!("press {}", key);
        self.desktop.input.press(key)
    }

    pub fn chord(&self, keys: &[Key]) -> Result<(), AutomationError> {
        debug!(
            "chord {}",
            keys.iter().map(Key::to_string).collect::<Vec<_>>().join("+")
        );
        self.desktop.input.chord(keys)
    }

    /// Wait for the UI to catch up
    pub fn settle(&self, duration: Duration) {
        self.desktop.clock.sleep(duration);
    }

    pub fn screenshot(&self, name: &str) -> Option<PathBuf> {
        self.audit.capture(name)
    }

    pub fn activate_window(&self, title: &str, timeout: Duration) -> bool {
        self.windows.activate(title, timeout)
    }

    pub fn launch(&self, executable: &Path) -> Result<(), AutomationError> {
        self.windows.launch(executable)
    }
}
