//! Uploaded reference documents
//!
//! - `extract`: plain-text extraction from PDF and DOCX bytes
//! - `storage`: local disk storage with optional remote blob storage

mod extract;
mod storage;

pub use extract::extract_text;
pub use storage::{
    secure_filename, stored_filename, BlobStore, CloudinaryStore, DocumentStorage, LocalStore,
    RemoteObject, StoredFile,
};
