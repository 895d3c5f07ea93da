//! Purchase receipt entry in the ERP client
//!
//! One run opens a blank receipt form, fills the header fields, pastes the
//! order and quantity columns into the grid, deletes every row the client
//! flags, then saves, audits and confirms. Every run ends with an attempt to
//! close the client so the next run starts from a known state.

use crate::config::{ErpSettings, GridTarget, ReceiptSettings};
use crate::executor::{ActionExecutor, ActionOutcome, Step};
use crate::templates::TemplateKind;
use crate::types::{Key, MatchResult, MouseButton, Point};
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Rows flagged after the column paste
pub(crate) const ERROR_INDICATORS: [TemplateKind; 2] =
    [TemplateKind::ReceiptError1, TemplateKind::ReceiptError2];

/// Rows flagged once the post-save warning dialog was dismissed, in priority order
pub(crate) const WARNING_INDICATORS: [TemplateKind; 4] = [
    TemplateKind::ReceiptWarning1,
    TemplateKind::ReceiptWarning2,
    TemplateKind::ReceiptError1,
    TemplateKind::ReceiptError2,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    #[serde(rename = "orderId", alias = "order_id")]
    pub order_id: String,
    pub quantity: i64,
    /// Other fields of the delivery feed, kept but unused
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeliveryRecord {
    pub fn new(order_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            order_id: order_id.into(),
            quantity,
            extra: serde_json::Map::new(),
        }
    }
}

/// Deliveries of one supplier on one date, entered as one receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryBatch {
    pub date: String,
    pub supplier: String,
    #[serde(default)]
    pub records: Vec<DeliveryRecord>,
}

/// Grid paste payload: one value per line, CRLF separated
pub fn order_column(records: &[DeliveryRecord]) -> String {
    records
        .iter()
        .map(|r| r.order_id.as_str())
        .collect::<Vec<_>>()
        .join("\r\n")
}

pub fn quantity_column(records: &[DeliveryRecord]) -> String {
    records
        .iter()
        .map(|r| r.quantity.to_string())
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptState {
    Closed,
    AppOpen,
    SystemMenuOpen,
    DataEntryListOpen,
    NewEntryFormOpen,
    DocumentTypeSet,
    SupplierSet,
    DateSet,
    RemarkSet,
    OrderColumnPasted,
    QuantityColumnPasted,
    ErrorResolution,
    Saved,
    WarningResolution,
    Audited,
    Confirmed,
}

impl fmt::Display for ReceiptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct ReceiptWorkflow {
    executor: ActionExecutor,
    erp: ErpSettings,
    settings: ReceiptSettings,
    state: ReceiptState,
}

impl ReceiptWorkflow {
    pub fn new(executor: ActionExecutor, erp: ErpSettings, settings: ReceiptSettings) -> Self {
        Self {
            executor,
            erp,
            settings,
            state: ReceiptState::Closed,
        }
    }

    pub fn state(&self) -> ReceiptState {
        self.state
    }

    fn transition(&mut self, next: ReceiptState) {
        debug!("receipt state {} -> {}", self.state, next);
        self.state = next;
    }

    fn settle(&self, duration: Duration) {
        self.executor.settle(duration);
    }

    /// Enter every non-empty batch as its own receipt.
    ///
    /// Stops at the first failed batch. A panic inside a run is contained
    /// here and followed by one more shutdown attempt.
    #[instrument(skip_all, fields(batches = batches.len()))]
    pub fn process_delivery_orders(&mut self, batches: &[DeliveryBatch]) -> bool {
        info!("starting receipt entry for {} batch(es)", batches.len());
        for batch in batches {
            if batch.records.is_empty() {
                debug!("skipping {} {}: no records", batch.supplier, batch.date);
                continue;
            }

            info!(
                "entering receipt for {} on {} ({} rows)",
                batch.supplier,
                batch.date,
                batch.records.len()
            );
            let run = panic::catch_unwind(AssertUnwindSafe(|| {
                self.process_delivery_data(&batch.date, &batch.supplier, &batch.records)
            }));
            match run {
                Ok(true) => {}
                Ok(false) => {
                    error!("receipt for {} on {} failed", batch.supplier, batch.date);
                    return false;
                }
                Err(payload) => {
                    error!(
                        "receipt run for {} on {} panicked: {}",
                        batch.supplier,
                        batch.date,
                        panic_message(payload.as_ref())
                    );
                    self.shutdown_system();
                    return false;
                }
            }
        }
        info!("receipt entry finished");
        true
    }

    /// Enter one receipt, then close the client whatever the outcome.
    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn process_delivery_data(
        &mut self,
        date: &str,
        supplier: &str,
        records: &[DeliveryRecord],
    ) -> bool {
        if records.is_empty() {
            warn!("no records for {} on {}, nothing to enter", supplier, date);
            return true;
        }

        let result = self
            .open_with_retries()
            .and_then(|()| self.enter_receipt(date, supplier, records));

        let succeeded = match result {
            Ok(()) => {
                info!("receipt for {} on {} confirmed", supplier, date);
                true
            }
            Err(AutomationError::Cancelled) => {
                warn!("receipt for {} on {} cancelled in state {}", supplier, date, self.state);
                false
            }
            Err(e) => {
                error!(
                    "receipt for {} on {} failed in state {}: {}",
                    supplier, date, self.state, e
                );
                self.executor.screenshot("receipt_failed");
                false
            }
        };

        self.shutdown_system();
        succeeded
    }

    fn enter_receipt(
        &mut self,
        date: &str,
        supplier: &str,
        records: &[DeliveryRecord],
    ) -> Result<(), AutomationError> {
        self.fill_header(date, supplier)?;
        self.paste_columns(records)?;

        self.transition(ReceiptState::ErrorResolution);
        let removed = self.resolve_flagged_rows(&ERROR_INDICATORS)?;
        if removed > 0 {
            info!("{}: removed {} rows flagged as errors", supplier, removed);
        }

        self.save_audit_confirm(supplier)
    }

    /// Reach a blank receipt form, retrying the whole navigation.
    pub fn open_with_retries(&mut self) -> Result<(), AutomationError> {
        let attempts = self.settings.open_attempts.max(1);
        for attempt in 1..=attempts {
            match self.open_new_receipt() {
                Ok(()) => return Ok(()),
                Err(AutomationError::Cancelled) => return Err(AutomationError::Cancelled),
                Err(e) => {
                    self.executor.screenshot("erp_open_failed");
                    if attempt == attempts {
                        error!("opening the receipt form failed on the last attempt: {}", e);
                        break;
                    }
                    warn!(
                        "opening the receipt form failed ({}), retrying {}/{}",
                        e, attempt, attempts
                    );
                    self.executor
                        .activate_window(&self.erp.main_window, self.erp.activate_timeout);
                    self.settle(self.settings.open_retry_pause);
                }
            }
        }
        Err(AutomationError::OpenSequenceExhausted { attempts })
    }

    /// One pass of the navigation from the main window to a blank form
    pub fn open_new_receipt(&mut self) -> Result<(), AutomationError> {
        self.executor.ensure_active()?;
        self.transition(ReceiptState::Closed);
        self.open_erp()?;
        self.transition(ReceiptState::AppOpen);
        self.settle(self.erp.startup_settle);

        let navigation = [
            (
                Step::click("open IC design system", TemplateKind::IcDesignSystem)
                    .in_window(&self.erp.main_window),
                Some(ReceiptState::SystemMenuOpen),
            ),
            (
                Step::click("open receipt maintenance", TemplateKind::ReceiptButton)
                    .in_window(&self.erp.main_window),
                Some(ReceiptState::DataEntryListOpen),
            ),
            (
                Step::click("new receipt", TemplateKind::ReceiptNew)
                    .in_window(&self.erp.receipt_list_window),
                None,
            ),
            (
                Step::locate("new receipt form", TemplateKind::ReceiptNewMain)
                    .in_window(&self.erp.receipt_form_window),
                Some(ReceiptState::NewEntryFormOpen),
            ),
        ];

        for (step, reached) in navigation {
            self.executor.require(&step)?;
            if let Some(state) = reached {
                self.transition(state);
            }
            self.settle(self.settings.step_pause);
        }
        Ok(())
    }

    /// Focus the main window, launching the client if it is not running
    fn open_erp(&self) -> Result<(), AutomationError> {
        if self
            .executor
            .activate_window(&self.erp.main_window, self.erp.activate_timeout)
        {
            return Ok(());
        }

        info!("ERP client not running, launching {}", self.erp.executable.display());
        self.executor.launch(&self.erp.executable)?;
        if self
            .executor
            .activate_window(&self.erp.main_window, self.erp.launch_timeout)
        {
            return Ok(());
        }

        error!(
            "ERP main window did not appear within {:?}",
            self.erp.launch_timeout
        );
        self.executor.screenshot("erp_start_failed");
        Err(AutomationError::WindowNotFound(self.erp.main_window.clone()))
    }

    fn fill_header(&mut self, date: &str, supplier: &str) -> Result<(), AutomationError> {
        let delays = self.settings.delays.clone();

        self.executor
            .require(&Step::click("document type", TemplateKind::DocumentType))?;
        self.executor.paste_text(&self.settings.document_type)?;
        self.settle(delays.lookup_field);
        self.executor.press(Key::Enter)?;
        self.settle(delays.after_document_type);
        self.transition(ReceiptState::DocumentTypeSet);

        self.executor
            .require(&Step::click("supplier", TemplateKind::ReceiptSupply))?;
        self.executor.paste_text(supplier)?;
        self.settle(delays.lookup_field);
        self.executor.press(Key::Enter)?;
        self.settle(delays.field_advance);
        self.executor.press(Key::Enter)?;
        self.settle(delays.field_advance);
        self.executor.press(Key::Enter)?;
        self.transition(ReceiptState::SupplierSet);

        // focus is in the delivery date field now
        self.executor.paste_text(date)?;
        self.executor.press(Key::Enter)?;
        self.transition(ReceiptState::DateSet);

        self.executor
            .require(&Step::click("remark", TemplateKind::ReceiptRemark))?;
        self.settle(delays.focus);
        self.executor.paste_text(&format!("{supplier} {date}"))?;
        self.transition(ReceiptState::RemarkSet);
        Ok(())
    }

    fn paste_columns(&mut self, records: &[DeliveryRecord]) -> Result<(), AutomationError> {
        let grid = self.settings.grid.clone();
        let delays = self.settings.delays.clone();

        self.paste_column(
            "order column",
            TemplateKind::ReceiptResourceId,
            &grid.order_column,
            &order_column(records),
        )?;
        self.settle(delays.order_paste);
        self.transition(ReceiptState::OrderColumnPasted);

        self.paste_column(
            "quantity column",
            TemplateKind::ReceiptBusinessQty,
            &grid.quantity_column,
            &quantity_column(records),
        )?;
        self.settle(delays.quantity_paste);
        self.transition(ReceiptState::QuantityColumnPasted);
        Ok(())
    }

    /// Select the first cell under a column header and paste `payload` as a region
    fn paste_column(
        &self,
        name: &str,
        header: TemplateKind,
        target: &GridTarget,
        payload: &str,
    ) -> Result<(), AutomationError> {
        let focus = self.settings.delays.focus;
        let anchor = self.executor.require(&Step::locate(name, header))?;
        self.settle(focus);

        let cell = target.resolve(anchor.point());
        debug!("{} anchor at {}, first cell at {}", name, anchor.point(), cell);
        self.executor.click_at(cell, MouseButton::Left)?;
        self.settle(focus);
        self.executor.set_clipboard(payload)?;
        self.executor.click_at(cell, MouseButton::Right)?;
        self.settle(focus);

        self.executor.require(&Step::click(
            format!("{name} region paste"),
            TemplateKind::ReceiptRegionPaste,
        ))?;
        Ok(())
    }

    /// Delete flagged grid rows until a full round over `indicators` finds none.
    ///
    /// Each row deletion clears its indicator, so the loop has no cap of its
    /// own; cancellation is checked before every round. Returns the number
    /// of deleted rows.
    pub fn resolve_flagged_rows(
        &mut self,
        indicators: &[TemplateKind],
    ) -> Result<usize, AutomationError> {
        let delay = self.settings.delays.row_delete;
        let mut removed = 0;
        loop {
            self.executor.ensure_active()?;
            let Some((kind, hit)) = self.first_flagged(indicators)? else {
                break;
            };

            info!("{} flags row at y={}, deleting it", kind, hit.y);
            self.executor.click_at(
                Point::new(self.settings.grid.row_selector_x, hit.y),
                MouseButton::Left,
            )?;
            self.executor
                .screenshot(&format!("locate_{}", kind.key().to_ascii_lowercase()));
            self.settle(delay);
            self.executor.chord(&[Key::Control, Key::Letter('d')])?;
            self.settle(delay);
            self.executor.press(Key::Letter('y'))?;
            self.settle(delay);
            removed += 1;
        }
        Ok(removed)
    }

    fn first_flagged(
        &self,
        indicators: &[TemplateKind],
    ) -> Result<Option<(TemplateKind, MatchResult)>, AutomationError> {
        for &kind in indicators {
            if let Some(hit) = self.executor.probe(kind)? {
                return Ok(Some((kind, hit)));
            }
        }
        Ok(None)
    }

    fn save_audit_confirm(&mut self, supplier: &str) -> Result<(), AutomationError> {
        let form = self.erp.receipt_form_window.clone();

        self.executor
            .require(&Step::click("save", TemplateKind::Save).in_window(&form))?;
        self.transition(ReceiptState::Saved);
        self.settle(self.settings.delays.after_save);

        match self
            .executor
            .execute(&Step::locate("warning dialog", TemplateKind::Warning))?
        {
            ActionOutcome::Cancelled => return Err(AutomationError::Cancelled),
            outcome if outcome.is_success() => {
                info!("warning dialog after save, reviewing flagged rows");
                self.executor
                    .require(&Step::click("dismiss warning", TemplateKind::No))?;
                self.settle(self.settings.delays.row_delete);

                self.transition(ReceiptState::WarningResolution);
                let removed = self.resolve_flagged_rows(&WARNING_INDICATORS)?;
                info!("{}: removed {} rows flagged after save", supplier, removed);

                self.executor
                    .require(&Step::click("save", TemplateKind::Save).in_window(&form))?;
                self.transition(ReceiptState::Saved);
            }
            _ => debug!("no warning dialog after save"),
        }

        self.executor
            .require(&Step::click("audit", TemplateKind::Audit))?;
        self.transition(ReceiptState::Audited);
        self.executor
            .require(&Step::click("confirm", TemplateKind::Confirm))?;
        self.transition(ReceiptState::Confirmed);
        self.settle(self.settings.delays.after_confirm);
        Ok(())
    }

    /// Close the ERP client through its system menu.
    ///
    /// Returns `false` when the main window cannot be found or the close
    /// confirmation could not be dismissed.
    pub fn shutdown_system(&mut self) -> bool {
        info!("closing ERP client");
        if !self
            .executor
            .activate_window(&self.erp.main_window, self.erp.activate_timeout)
        {
            error!("ERP main window is not open");
            self.executor.screenshot("erp_window_not_found");
            return false;
        }

        let closed = match self.close_main_window() {
            Ok(closed) => closed,
            Err(e) => {
                error!("failed to close ERP client: {}", e);
                false
            }
        };
        if closed {
            self.transition(ReceiptState::Closed);
        } else {
            self.executor.screenshot("erp_close_failed");
        }
        closed
    }

    fn close_main_window(&self) -> Result<bool, AutomationError> {
        self.executor.chord(&[Key::Alt, Key::Space])?;
        self.executor.press(Key::Letter('c'))?;
        self.settle(self.settings.delays.close_prompt);
        self.executor.press(Key::Letter('y'))?;

        match self
            .executor
            .execute(&Step::click("dismiss close prompt", TemplateKind::No))?
        {
            ActionOutcome::Clicked(_) => {
                info!("ERP client closed after dismissing the prompt");
                Ok(true)
            }
            _ => {
                debug!("no close prompt, assuming the client closed");
                Ok(true)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
