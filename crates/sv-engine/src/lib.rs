//! Application layer for Secure Vision
//!
//! `DocumentService` ties storage, detection, masking and the file codec
//! together behind the operations the server and CLI expose.

pub mod password;
pub mod service;

pub use service::{
    AdminOverview, BINARY_PLACEHOLDER, Dashboard, DocumentService, Download, FilePreview,
    FileView, ServiceSettings, Upload,
};
