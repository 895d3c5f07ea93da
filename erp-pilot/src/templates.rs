//! Reference images and their cache
//!
//! The set of templates is closed: every image the workflows look for is a
//! [`TemplateKind`] variant mapped to a file name in the template directory.
//! Raw paths are still accepted through [`TemplateRef::Path`] for ad-hoc
//! lookups.

use crate::AutomationError;
use image::GrayImage;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    IcDesignSystem,
    ReceiptButton,
    ReceiptNew,
    ReceiptMain,
    ReceiptNewMain,
    Save,
    Audit,
    Confirm,
    Yes,
    No,
    Warning,
    ReceiptSupply,
    ReceiptResourceId,
    ReceiptBusinessQty,
    ReceiptRegionPaste,
    ReceiptRemark,
    DocumentType,
    ReceiptError1,
    ReceiptError2,
    ReceiptWarning1,
    ReceiptWarning2,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 21] = [
        TemplateKind::IcDesignSystem,
        TemplateKind::ReceiptButton,
        TemplateKind::ReceiptNew,
        TemplateKind::ReceiptMain,
        TemplateKind::ReceiptNewMain,
        TemplateKind::Save,
        TemplateKind::Audit,
        TemplateKind::Confirm,
        TemplateKind::Yes,
        TemplateKind::No,
        TemplateKind::Warning,
        TemplateKind::ReceiptSupply,
        TemplateKind::ReceiptResourceId,
        TemplateKind::ReceiptBusinessQty,
        TemplateKind::ReceiptRegionPaste,
        TemplateKind::ReceiptRemark,
        TemplateKind::DocumentType,
        TemplateKind::ReceiptError1,
        TemplateKind::ReceiptError2,
        TemplateKind::ReceiptWarning1,
        TemplateKind::ReceiptWarning2,
    ];

    /// File name inside the template directory
    pub fn file_name(self) -> &'static str {
        match self {
            TemplateKind::IcDesignSystem => "ic_design_system_button.png",
            TemplateKind::ReceiptButton => "receipt_button.png",
            TemplateKind::ReceiptNew => "receipt_new.png",
            TemplateKind::ReceiptMain => "receipt_main.png",
            TemplateKind::ReceiptNewMain => "receipt_new_main.png",
            TemplateKind::Save => "save.png",
            TemplateKind::Audit => "audit.png",
            TemplateKind::Confirm => "confirm.png",
            TemplateKind::Yes => "yes.png",
            TemplateKind::No => "no.png",
            TemplateKind::Warning => "warning.png",
            TemplateKind::ReceiptSupply => "receipt_supply.png",
            TemplateKind::ReceiptResourceId => "receipt_resource_id.png",
            TemplateKind::ReceiptBusinessQty => "receipt_businessQty.png",
            TemplateKind::ReceiptRegionPaste => "receipt_region_paste.png",
            TemplateKind::ReceiptRemark => "receipt_remark.png",
            TemplateKind::DocumentType => "document_type.png",
            TemplateKind::ReceiptError1 => "receipt_error_1.png",
            TemplateKind::ReceiptError2 => "receipt_error_2.png",
            TemplateKind::ReceiptWarning1 => "receipt_warning_1.png",
            TemplateKind::ReceiptWarning2 => "receipt_warning_2.png",
        }
    }

    /// Registry key, e.g. `RECEIPT_ERROR_1`
    pub fn key(self) -> &'static str {
        match self {
            TemplateKind::IcDesignSystem => "IC_DESIGN_SYSTEM",
            TemplateKind::ReceiptButton => "RECEIPT_BUTTON",
            TemplateKind::ReceiptNew => "RECEIPT_NEW",
            TemplateKind::ReceiptMain => "RECEIPT_MAIN",
            TemplateKind::ReceiptNewMain => "RECEIPT_NEW_MAIN",
            TemplateKind::Save => "SAVE",
            TemplateKind::Audit => "AUDIT",
            TemplateKind::Confirm => "CONFIRM",
            TemplateKind::Yes => "YES",
            TemplateKind::No => "NO",
            TemplateKind::Warning => "WARNING",
            TemplateKind::ReceiptSupply => "RECEIPT_SUPPLY",
            TemplateKind::ReceiptResourceId => "RECEIPT_RESOURCE_ID",
            TemplateKind::ReceiptBusinessQty => "RECEIPT_BUSINESS_QTY",
            TemplateKind::ReceiptRegionPaste => "RECEIPT_REGION_PASTE",
            TemplateKind::ReceiptRemark => "RECEIPT_REMARK",
            TemplateKind::DocumentType => "DOCUMENT_TYPE",
            TemplateKind::ReceiptError1 => "RECEIPT_ERROR_1",
            TemplateKind::ReceiptError2 => "RECEIPT_ERROR_2",
            TemplateKind::ReceiptWarning1 => "RECEIPT_WARNING_1",
            TemplateKind::ReceiptWarning2 => "RECEIPT_WARNING_2",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TemplateKind {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AutomationError::UnknownTemplateKind(s.to_string()))
    }
}

/// Either a registered template or an explicit image path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    Kind(TemplateKind),
    Path(PathBuf),
}

impl TemplateRef {
    /// Short name used in logs and screenshot file names
    pub fn label(&self) -> String {
        match self {
            TemplateRef::Kind(kind) => kind.key().to_ascii_lowercase(),
            TemplateRef::Path(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

impl From<TemplateKind> for TemplateRef {
    fn from(kind: TemplateKind) -> Self {
        TemplateRef::Kind(kind)
    }
}

impl From<PathBuf> for TemplateRef {
    fn from(path: PathBuf) -> Self {
        TemplateRef::Path(path)
    }
}

impl From<&Path> for TemplateRef {
    fn from(path: &Path) -> Self {
        TemplateRef::Path(path.to_path_buf())
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateRef::Kind(kind) => write!(f, "{kind}"),
            TemplateRef::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Decoded template, kept as luma since matching ignores color
#[derive(Debug)]
pub struct TemplateImage {
    pub path: PathBuf,
    pub pixels: GrayImage,
}

/// Owns the template directory and caches decoded images by path.
///
/// Each store has its own cache; two engines never share one implicitly.
pub struct TemplateStore {
    dir: PathBuf,
    cache: Mutex<HashMap<PathBuf, Arc<TemplateImage>>>,
}

impl TemplateStore {
    /// Opens `dir` and checks that every registered template exists.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            error!("template directory does not exist: {}", dir.display());
            return Err(AutomationError::TemplateDirectoryMissing(dir));
        }

        let missing: Vec<&str> = TemplateKind::ALL
            .iter()
            .map(|kind| kind.file_name())
            .filter(|name| !dir.join(name).is_file())
            .collect();
        if !missing.is_empty() {
            error!("missing template files: {}", missing.join(", "));
            return Err(AutomationError::TemplateAssetMissing(missing.join(", ")));
        }

        debug!("template directory verified");
        Ok(Self {
            dir,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Path of a registered template looked up by its key
    pub fn get(&self, key: &str) -> Result<PathBuf, AutomationError> {
        let kind = key.parse::<TemplateKind>()?;
        Ok(self.path_of(kind))
    }

    pub fn path_of(&self, kind: TemplateKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn resolve(&self, template: &TemplateRef) -> PathBuf {
        match template {
            TemplateRef::Kind(kind) => self.path_of(*kind),
            TemplateRef::Path(path) => path.clone(),
        }
    }

    /// Decodes the image at `path`, serving repeated requests from the cache.
    pub fn load(&self, path: &Path) -> Result<Arc<TemplateImage>, AutomationError> {
        if let Some(hit) = self.lock_cache().get(path) {
            return Ok(hit.clone());
        }

        if !path.is_file() {
            error!("template file does not exist: {}", path.display());
            return Err(AutomationError::TemplateAssetMissing(
                path.display().to_string(),
            ));
        }

        // decoded from memory so non-ASCII paths behave the same everywhere
        let bytes = std::fs::read(path)?;
        let decoded = image::load_from_memory(&bytes).map_err(|source| {
            AutomationError::TemplateDecode {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let template = Arc::new(TemplateImage {
            path: path.to_path_buf(),
            pixels: decoded.to_luma8(),
        });
        self.lock_cache()
            .insert(path.to_path_buf(), template.clone());
        debug!("loaded template {}", path.display());
        Ok(template)
    }

    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<TemplateImage>>> {
        // a poisoned cache still holds valid decoded images
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
