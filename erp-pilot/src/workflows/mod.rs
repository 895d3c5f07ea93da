pub mod receipt;

pub use receipt::{DeliveryBatch, DeliveryRecord, ReceiptState, ReceiptWorkflow};
