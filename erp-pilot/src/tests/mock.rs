//! Scripted platform doubles and a harness wiring them into an executor

use crate::audit::AuditTrail;
use crate::cancellation::CancellationMonitor;
use crate::config::EngineConfig;
use crate::executor::{ActionExecutor, RetryPolicy};
use crate::matcher::TemplateLocator;
use crate::platforms::{Clock, Desktop, InputDevice, ScreenSource, WindowSystem};
use crate::templates::{TemplateKind, TemplateStore};
use crate::types::{Key, MatchResult, MouseButton, Point, ScreenshotResult, WindowHandle};
use crate::workflows::ReceiptWorkflow;
use crate::AutomationError;
use image::{GrayImage, Luma, RgbaImage};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub fn hit(x: i32, y: i32) -> MatchResult {
    MatchResult {
        x,
        y,
        confidence: 0.97,
    }
}

fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Default)]
struct LocatorState {
    scripts: HashMap<String, VecDeque<Option<MatchResult>>>,
    visible: HashMap<String, MatchResult>,
    attempts: HashMap<String, usize>,
    thresholds: Vec<f32>,
    panics: HashSet<String>,
}

/// Answers locate calls from per-template scripts.
///
/// A scripted answer is consumed per call; once a script runs dry the
/// template falls back to its visible/hidden state.
#[derive(Default)]
pub struct ScriptedLocator {
    state: Mutex<LocatorState>,
}

impl ScriptedLocator {
    pub fn show(&self, kind: TemplateKind, at: MatchResult) {
        let mut state = self.state.lock().unwrap();
        state.visible.insert(kind.file_name().to_string(), at);
    }

    pub fn show_all(&self, kinds: &[TemplateKind]) {
        for (i, kind) in kinds.iter().enumerate() {
            self.show(*kind, hit(300 + i as i32 * 10, 200));
        }
    }

    pub fn hide(&self, kind: TemplateKind) {
        let mut state = self.state.lock().unwrap();
        state.visible.remove(kind.file_name());
    }

    pub fn script(&self, kind: TemplateKind, answers: Vec<Option<MatchResult>>) {
        let mut state = self.state.lock().unwrap();
        state
            .scripts
            .insert(kind.file_name().to_string(), answers.into());
    }

    pub fn panic_on(&self, kind: TemplateKind) {
        let mut state = self.state.lock().unwrap();
        state.panics.insert(kind.file_name().to_string());
    }

    pub fn attempts(&self, kind: TemplateKind) -> usize {
        let state = self.state.lock().unwrap();
        state.attempts.get(kind.file_name()).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.state.lock().unwrap().attempts.values().sum()
    }

    pub fn thresholds(&self) -> Vec<f32> {
        self.state.lock().unwrap().thresholds.clone()
    }
}

impl TemplateLocator for ScriptedLocator {
    fn locate(
        &self,
        template: &Path,
        threshold: f32,
    ) -> Result<Option<MatchResult>, AutomationError> {
        let key = file_key(template);
        let answer = {
            let mut state = self.state.lock().unwrap();
            *state.attempts.entry(key.clone()).or_default() += 1;
            state.thresholds.push(threshold);
            if state.panics.contains(&key) {
                None
            } else {
                let scripted = state.scripts.get_mut(&key).and_then(|q| q.pop_front());
                Some(match scripted {
                    Some(answer) => answer,
                    None => state.visible.get(&key).copied(),
                })
            }
        };
        match answer {
            Some(found) => Ok(found),
            None => panic!("scripted panic while locating {key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Move(Point),
    Click(MouseButton),
    Press(Key),
    Chord(Vec<Key>),
    Clipboard(String),
}

/// Records every input call; can cancel a monitor on the row-delete chord
#[derive(Default)]
pub struct RecordingInput {
    events: Mutex<Vec<InputEvent>>,
    cancel_on_delete: Mutex<Option<CancellationMonitor>>,
}

impl RecordingInput {
    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clipboard(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Clipboard(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn chords(&self, keys: &[Key]) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, InputEvent::Chord(k) if k.as_slice() == keys))
            .count()
    }

    pub fn cancel_on_delete(&self, monitor: CancellationMonitor) {
        *self.cancel_on_delete.lock().unwrap() = Some(monitor);
    }

    fn record(&self, event: InputEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl InputDevice for RecordingInput {
    fn move_pointer(&self, to: Point, _duration: Duration) -> Result<(), AutomationError> {
        self.record(InputEvent::Move(to));
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<(), AutomationError> {
        self.record(InputEvent::Click(button));
        Ok(())
    }

    fn press(&self, key: Key) -> Result<(), AutomationError> {
        self.record(InputEvent::Press(key));
        Ok(())
    }

    fn chord(&self, keys: &[Key]) -> Result<(), AutomationError> {
        self.record(InputEvent::Chord(keys.to_vec()));
        if keys == [Key::Control, Key::Letter('d')] {
            if let Some(monitor) = self.cancel_on_delete.lock().unwrap().as_ref() {
                monitor.cancel();
            }
        }
        Ok(())
    }

    fn set_clipboard(&self, text: &str) -> Result<(), AutomationError> {
        self.record(InputEvent::Clipboard(text.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCall {
    Find(String),
    Restore(String),
    Maximize(String),
    Foreground(String),
    Launch(PathBuf),
}

#[derive(Default)]
struct WindowState {
    titles: Vec<String>,
    present: HashSet<String>,
    minimized: HashSet<String>,
    appear_on_launch: Vec<String>,
    calls: Vec<WindowCall>,
}

impl WindowState {
    fn handle(&mut self, title: &str) -> WindowHandle {
        let index = match self.titles.iter().position(|t| t == title) {
            Some(index) => index,
            None => {
                self.titles.push(title.to_string());
                self.titles.len() - 1
            }
        };
        WindowHandle(index as isize)
    }

    fn title(&self, window: WindowHandle) -> String {
        self.titles[window.0 as usize].clone()
    }
}

/// In-memory window table
#[derive(Default)]
pub struct MockWindows {
    state: Mutex<WindowState>,
}

impl MockWindows {
    pub fn open(&self, title: &str) {
        self.state.lock().unwrap().present.insert(title.to_string());
    }

    pub fn minimize(&self, title: &str) {
        self.state.lock().unwrap().minimized.insert(title.to_string());
    }

    pub fn open_on_launch(&self, title: &str) {
        let mut state = self.state.lock().unwrap();
        state.appear_on_launch.push(title.to_string());
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn finds(&self, title: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, WindowCall::Find(t) if t == title))
            .count()
    }
}

impl WindowSystem for MockWindows {
    fn find_window(&self, title: &str) -> Result<Option<WindowHandle>, AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(WindowCall::Find(title.to_string()));
        if state.present.contains(title) {
            Ok(Some(state.handle(title)))
        } else {
            Ok(None)
        }
    }

    fn is_minimized(&self, window: WindowHandle) -> Result<bool, AutomationError> {
        let state = self.state.lock().unwrap();
        Ok(state.minimized.contains(&state.title(window)))
    }

    fn restore(&self, window: WindowHandle) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        let title = state.title(window);
        state.minimized.remove(&title);
        state.calls.push(WindowCall::Restore(title));
        Ok(())
    }

    fn maximize(&self, window: WindowHandle) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        let title = state.title(window);
        state.calls.push(WindowCall::Maximize(title));
        Ok(())
    }

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        let title = state.title(window);
        state.calls.push(WindowCall::Foreground(title));
        Ok(())
    }

    fn launch(&self, executable: &Path) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(WindowCall::Launch(executable.to_path_buf()));
        let appearing = std::mem::take(&mut state.appear_on_launch);
        state.present.extend(appearing);
        Ok(())
    }
}

/// Clock that advances only when slept on
pub struct VirtualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }
}

impl VirtualClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn sleeps_of(&self, duration: Duration) -> usize {
        self.sleeps().iter().filter(|d| **d == duration).count()
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        *self.elapsed.lock().unwrap() += duration;
    }
}

/// Serves a fixed frame
pub struct StaticScreen {
    frame: RgbaImage,
    origin: Point,
}

impl StaticScreen {
    pub fn new(frame: RgbaImage, origin: Point) -> Self {
        Self { frame, origin }
    }

    pub fn blank() -> Self {
        Self::new(RgbaImage::new(8, 8), Point::new(0, 0))
    }
}

impl ScreenSource for StaticScreen {
    fn capture(&self) -> Result<ScreenshotResult, AutomationError> {
        Ok(ScreenshotResult::from_image(self.frame.clone(), self.origin))
    }
}

/// Write a small placeholder image for every registered template
pub fn write_templates(dir: &Path) {
    for (i, kind) in TemplateKind::ALL.iter().enumerate() {
        GrayImage::from_pixel(4, 4, Luma([i as u8 * 10]))
            .save(dir.join(kind.file_name()))
            .unwrap();
    }
}

/// Executor and workflow wired to scripted doubles
pub struct Harness {
    pub locator: Arc<ScriptedLocator>,
    pub input: Arc<RecordingInput>,
    pub windows: Arc<MockWindows>,
    pub clock: Arc<VirtualClock>,
    pub cancellation: CancellationMonitor,
    pub config: EngineConfig,
    templates: Arc<TemplateStore>,
    _template_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        super::init_tracing();
        let template_dir = tempfile::tempdir().unwrap();
        write_templates(template_dir.path());

        let config = EngineConfig {
            template_dir: template_dir.path().to_path_buf(),
            screenshot_dir: None,
            ..EngineConfig::default()
        };

        Self {
            locator: Arc::new(ScriptedLocator::default()),
            input: Arc::new(RecordingInput::default()),
            windows: Arc::new(MockWindows::default()),
            clock: Arc::new(VirtualClock::default()),
            cancellation: CancellationMonitor::new(),
            templates: Arc::new(TemplateStore::open(template_dir.path()).unwrap()),
            config,
            _template_dir: template_dir,
        }
    }

    /// Every ERP window is open and every control except the row flags and
    /// dialogs is on screen
    pub fn erp_ready() -> Self {
        let harness = Self::erp_installed();
        harness.windows.open(&harness.config.erp.main_window);
        harness
    }

    /// Like [`erp_ready`](Self::erp_ready) but the main window is not open yet
    pub fn erp_installed() -> Self {
        let harness = Self::new();
        harness.windows.open(&harness.config.erp.receipt_list_window);
        harness.windows.open(&harness.config.erp.receipt_form_window);
        harness.locator.show_all(&[
            TemplateKind::IcDesignSystem,
            TemplateKind::ReceiptButton,
            TemplateKind::ReceiptNew,
            TemplateKind::ReceiptNewMain,
            TemplateKind::DocumentType,
            TemplateKind::ReceiptSupply,
            TemplateKind::ReceiptRemark,
            TemplateKind::ReceiptResourceId,
            TemplateKind::ReceiptBusinessQty,
            TemplateKind::ReceiptRegionPaste,
            TemplateKind::Save,
            TemplateKind::Audit,
            TemplateKind::Confirm,
        ]);
        harness
    }

    pub fn desktop(&self) -> Desktop {
        Desktop {
            screen: Arc::new(StaticScreen::blank()),
            windows: self.windows.clone(),
            input: self.input.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn executor(&self) -> ActionExecutor {
        let desktop = self.desktop();
        let audit = AuditTrail::disabled(desktop.screen.clone());
        ActionExecutor::new(
            desktop,
            self.templates.clone(),
            self.locator.clone(),
            audit,
            self.cancellation.clone(),
            RetryPolicy::from_config(&self.config),
        )
    }

    pub fn workflow(&self) -> ReceiptWorkflow {
        ReceiptWorkflow::new(
            self.executor(),
            self.config.erp.clone(),
            self.config.receipt.clone(),
        )
    }
}
