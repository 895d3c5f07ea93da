//! Screen-driven automation of an ERP desktop client
//!
//! The engine finds on-screen controls by matching reference images against
//! screen captures, then drives them with synthetic mouse and keyboard input.
//! Everything machine-specific sits behind the traits in [`platforms`], so the
//! workflows run unchanged against scripted doubles in tests.

pub mod audit;
pub mod cancellation;
pub mod config;
pub mod duration_parser;
pub mod errors;
pub mod executor;
pub mod matcher;
pub mod platforms;
pub mod templates;
#[cfg(test)]
mod tests;
pub mod types;
pub mod window;
pub mod workflows;

pub use audit::AuditTrail;
pub use cancellation::CancellationMonitor;
pub use config::{EngineConfig, ErpSettings, GridTarget, ReceiptSettings};
pub use errors::AutomationError;
pub use executor::{ActionExecutor, ActionOutcome, RetryPolicy, Step};
pub use matcher::{ScreenMatcher, TemplateLocator, DEFAULT_MATCH_THRESHOLD};
pub use platforms::{create_desktop, Clock, Desktop, InputDevice, ScreenSource, WindowSystem};
pub use templates::{TemplateKind, TemplateRef, TemplateStore};
pub use types::{Key, MatchResult, MouseButton, Point, ScreenshotResult};
pub use window::WindowController;
pub use workflows::{DeliveryBatch, DeliveryRecord, ReceiptState, ReceiptWorkflow};

#[cfg(target_os = "windows")]
pub use platforms::windows::spawn_escape_listener;

/// Build a receipt workflow on the native desktop from `config`
pub fn receipt_workflow(
    config: &EngineConfig,
    cancellation: CancellationMonitor,
) -> Result<ReceiptWorkflow, AutomationError> {
    let desktop = create_desktop()?;
    let executor = ActionExecutor::from_config(config, desktop, cancellation)?;
    Ok(ReceiptWorkflow::new(
        executor,
        config.erp.clone(),
        config.receipt.clone(),
    ))
}
