//! Merge Signature Library
//!
//! A small library for attaching a signature page to a PDF document.
//! Two arrangements are supported:
//! - Merge: overlay the source's last page content onto the signature page
//! - Append: add the signature as a new trailing page
//!
//! # Example
//!
//! ```no_run
//! use merge_signature::pdf::{merge_signature, SignatureMode, SignatureOptions};
//! use std::path::PathBuf;
//!
//! let options = SignatureOptions {
//!     source_path: PathBuf::from("contract.pdf"),
//!     signature_path: PathBuf::from("signature.pdf"),
//!     output_path: PathBuf::from("signed.pdf"),
//!     mode: SignatureMode::Merge,
//! };
//!
//! merge_signature(&options).expect("Failed to attach signature page");
//! ```

pub mod error;
pub mod pdf;

// Re-export commonly used items
pub use error::{Error, Result};
