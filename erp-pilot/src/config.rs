//! Engine configuration
//!
//! Every constant the engine relies on (thresholds, retry policy, window
//! titles, grid coordinates, settle delays) lives here with a default, so the
//! engine can run without a config file and environment drift can be
//! corrected in YAML instead of code.

use crate::duration_parser;
use crate::executor::{MAX_RETRIES, RETRY_INTERVAL};
use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use crate::types::Point;
use crate::AutomationError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory holding the reference images
    pub template_dir: PathBuf,
    /// Audit screenshots go here; `null` disables them
    pub screenshot_dir: Option<PathBuf>,
    pub match_threshold: f32,
    pub max_retries: usize,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub retry_interval: Duration,
    pub erp: ErpSettings,
    pub receipt: ReceiptSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates"),
            screenshot_dir: Some(PathBuf::from("screenshots")),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            max_retries: MAX_RETRIES,
            retry_interval: RETRY_INTERVAL,
            erp: ErpSettings::default(),
            receipt: ReceiptSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, AutomationError> {
        let config: EngineConfig = serde_yaml::from_str(text)
            .map_err(|e| AutomationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, AutomationError> {
        debug!("loading engine config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(AutomationError::InvalidConfig(format!(
                "match_threshold must be in (0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.max_retries == 0 {
            return Err(AutomationError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.receipt.open_attempts == 0 {
            return Err(AutomationError::InvalidConfig(
                "receipt.open_attempts must be at least 1".to_string(),
            ));
        }
        if self.erp.main_window.is_empty() {
            return Err(AutomationError::InvalidConfig(
                "erp.main_window must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the host application lives and how its windows are titled
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErpSettings {
    pub executable: PathBuf,
    pub main_window: String,
    pub receipt_list_window: String,
    pub receipt_form_window: String,
    /// How long to wait for an already running client to show up
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub activate_timeout: Duration,
    /// How long to wait for the first window after launching the client
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub launch_timeout: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub startup_settle: Duration,
}

impl Default for ErpSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(
                r"D:\Programs\Digiwin\E10\Client\Digiwin.Mars.Deployment.Client.exe",
            ),
            main_window: "鼎捷ERP E10 [华芯微正式|xinxf|苏州华芯微电子股份有限公司|华芯微工厂|华芯微销售域|华芯微公司采购域]".to_string(),
            receipt_list_window: "浏览 - 维护到货单".to_string(),
            receipt_form_window: "维护到货单".to_string(),
            activate_timeout: Duration::from_secs(1),
            launch_timeout: Duration::from_secs(30),
            startup_settle: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiptSettings {
    /// Document type code pasted into the first header field
    pub document_type: String,
    /// Attempts of the whole open sequence before giving up
    pub open_attempts: usize,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub open_retry_pause: Duration,
    /// Pause between the navigation steps of the open sequence
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub step_pause: Duration,
    pub grid: GridSettings,
    pub delays: ReceiptDelays,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            document_type: "3601".to_string(),
            open_attempts: 5,
            open_retry_pause: Duration::from_secs(2),
            step_pause: Duration::from_secs(3),
            grid: GridSettings::default(),
            delays: ReceiptDelays::default(),
        }
    }
}

/// Hard-coded grid coordinates.
///
/// The receipt grid has no per-row anchor, so these values are only valid for
/// the screen resolution and layout the templates were captured on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridSettings {
    pub order_column: GridTarget,
    pub quantity_column: GridTarget,
    /// Column clicked to select a row flagged by an error or warning marker
    pub row_selector_x: i32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            order_column: GridTarget::Absolute { x: 175, y: 479 },
            quantity_column: GridTarget::Absolute { x: 961, y: 479 },
            row_selector_x: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GridTarget {
    /// Fixed screen position
    Absolute { x: i32, y: i32 },
    /// Offset from the column header anchor that was located just before
    AnchorOffset { dx: i32, dy: i32 },
}

impl GridTarget {
    pub fn resolve(&self, anchor: Point) -> Point {
        match *self {
            GridTarget::Absolute { x, y } => Point::new(x, y),
            GridTarget::AnchorOffset { dx, dy } => anchor.offset(dx, dy),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiptDelays {
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub lookup_field: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub after_document_type: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub field_advance: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub focus: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub order_paste: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub quantity_paste: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub row_delete: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub after_save: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub after_confirm: Duration,
    #[serde(deserialize_with = "duration_parser::deserialize")]
    pub close_prompt: Duration,
}

impl Default for ReceiptDelays {
    fn default() -> Self {
        Self {
            lookup_field: Duration::from_secs(5),
            after_document_type: Duration::from_secs(2),
            field_advance: Duration::from_secs(1),
            focus: Duration::from_secs(1),
            order_paste: Duration::from_secs(30),
            quantity_paste: Duration::from_secs(5),
            row_delete: Duration::from_secs(1),
            after_save: Duration::from_secs(2),
            after_confirm: Duration::from_secs(2),
            close_prompt: Duration::from_secs(1),
        }
    }
}
