use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Template directory does not exist: {}", .0.display())]
    TemplateDirectoryMissing(PathBuf),

    #[error("Template asset missing: {0}")]
    TemplateAssetMissing(String),

    #[error("Failed to decode template {}: {source}", path.display())]
    TemplateDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Unknown template kind: {0}")]
    UnknownTemplateKind(String),

    #[error("Step failed: {step}")]
    StepFailed { step: String },

    #[error("Could not reach the new receipt form after {attempts} attempts")]
    OpenSequenceExhausted { attempts: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AutomationError {
    /// Errors fixed by correcting the configuration or the template set
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AutomationError::TemplateDirectoryMissing(_)
                | AutomationError::TemplateAssetMissing(_)
                | AutomationError::TemplateDecode { .. }
                | AutomationError::UnknownTemplateKind(_)
                | AutomationError::InvalidConfig(_)
                | AutomationError::UnsupportedPlatform(_)
        )
    }

    pub(crate) fn step(step: impl Into<String>) -> Self {
        AutomationError::StepFailed { step: step.into() }
    }
}
