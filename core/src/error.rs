//! Error types for the invoice API client.
//!
//! # Design
//! One variant per failure category. `InvalidParams` carries the full
//! per-field error map so callers can show every violation at once; it is
//! always raised before any network call. Server rejections keep the raw
//! status code and decoded body for debugging, whether the rejection came as
//! a non-200 status or as a multi-line 200 body.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors returned by `InvoiceClient` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Local validation failed; nothing was sent.
    #[error("invalid params: {0}")]
    InvalidParams(ValidationErrors),

    /// An inbound notification carried credentials that do not match the
    /// configured account.
    #[error("unauthorized request")]
    Unauthorized,

    /// An inbound notification was missing a field or carried a malformed one.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP round-trip itself failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-200 status or a multi-line error body.
    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// Text could not be transcoded to or from Shift-JIS.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Client configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}
