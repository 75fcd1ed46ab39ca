//! Client for the FamilyMart invoice API.
//!
//! # Overview
//! Issues, modifies and cancels convenience-store payment invoices, sends
//! acknowledgements for status notifications, and parses the notifications
//! the service posts back. The service speaks Shift-JIS form posts and a
//! one-line-is-success response protocol; this crate hides both.
//!
//! # Design
//! - `InvoiceClient` owns a `ClientConfig` (endpoint and credentials) and a
//!   `Transport`; there is no process-wide state.
//! - Each operation is split into `build_*` (validate + encode) and `parse_*`
//!   (decode + interpret), with blocking convenience methods on top.
//! - Parameter models validate locally with typed rule lists before anything
//!   is encoded.
//! - The `blocking` feature (on by default) provides `UreqTransport`.
//!
//! ```no_run
//! use chrono::{Days, Local};
//! use fmart_core::{ClientConfig, InvoiceClient, IssueInvoiceParams};
//!
//! let client = InvoiceClient::new(ClientConfig::from_env()?);
//! let params = IssueInvoiceParams {
//!     name: "松本行弘".to_string(),
//!     name_katakana: "マツモトヒロユキ".to_string(),
//!     phone_number: "0120-444-444".to_string(),
//!     amount: 100,
//!     expiry: Local::now().date_naive() + Days::new(7),
//! };
//! let receipt_no = client.issue_invoice(&params)?;
//! println!("issued {receipt_no}");
//! # Ok::<(), fmart_core::Error>(())
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod types;
pub mod validation;

pub use client::InvoiceClient;
pub use config::ClientConfig;
pub use error::Error;
#[cfg(feature = "blocking")]
pub use http::UreqTransport;
pub use http::{HttpRequest, HttpResponse, Transport};
pub use types::{InvoiceState, InvoiceStatus, IssueInvoiceParams, ModifyInvoiceParams, RequestType};
pub use validation::ValidationErrors;
