//! Domain types for the invoice API.
//!
//! # Design
//! Parameter models own their field values and expose `errors()` / `is_valid()`
//! plus a `to_form()` that renders the ordered wire fields. Credentials are
//! not part of the models; they are injected from `ClientConfig` when the
//! form is rendered so the same params can be sent by differently configured
//! clients.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::validation::{DateRule, IntRule, TextRule, ValidationErrors};

/// Largest amount the service accepts for a single invoice.
pub const MAX_AMOUNT: u32 = 999_999;

/// How many days ahead an invoice may expire.
pub const MAX_EXPIRY_DAYS: u64 = 60;

static PHONE_NUMBER_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2,5}-[0-9]{2,5}-[0-9]{3,4}$").expect("valid phone regex"));

const ID_RULES: [TextRule; 2] = [TextRule::MinLength(1), TextRule::MaxLength(18)];
const NAME_RULES: [TextRule; 2] = [TextRule::MinLength(1), TextRule::MaxLength(40)];
const NAME_KATAKANA_RULES: [TextRule; 2] = [TextRule::MinLength(1), TextRule::MaxLength(30)];
const AMOUNT_RULES: [IntRule; 2] = [IntRule::Min(1), IntRule::Max(MAX_AMOUNT as i64)];
const EXPIRY_RULES: [DateRule; 2] = [DateRule::After(0), DateRule::NotAfter(MAX_EXPIRY_DAYS)];

fn phone_number_rules() -> [TextRule; 3] {
    [
        TextRule::MinLength(1),
        TextRule::MaxLength(13),
        TextRule::Format(&PHONE_NUMBER_FORMAT),
    ]
}

/// The `regist_type` discriminator sent with every form request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Issue,
    Modify,
    Cancel,
}

impl RequestType {
    pub fn code(self) -> &'static str {
        match self {
            RequestType::Issue => "1",
            RequestType::Modify => "2",
            RequestType::Cancel => "9",
        }
    }
}

/// Renders a date as the service's `YYYYMMDD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Fields shared by issue and modify requests.
fn check_invoice_fields(
    errs: &mut ValidationErrors,
    today: NaiveDate,
    name: &str,
    name_katakana: &str,
    phone_number: &str,
    amount: u32,
    expiry: NaiveDate,
) {
    errs.check_text("name", name, &NAME_RULES);
    errs.check_text("name_katakana", name_katakana, &NAME_KATAKANA_RULES);
    errs.check_text("phone_number", phone_number, &phone_number_rules());
    errs.check_integer("amount", i64::from(amount), &AMOUNT_RULES);
    errs.check_date("expiry", expiry, today, &EXPIRY_RULES);
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn credentials(config: &ClientConfig, kind: RequestType) -> Vec<(&'static str, String)> {
    vec![
        ("login_user_id", config.user_id.clone()),
        ("login_password", config.password.clone()),
        ("regist_type", kind.code().to_string()),
    ]
}

/// Parameters for issuing a new invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoiceParams {
    pub name: String,
    /// Customer name in katakana.
    pub name_katakana: String,
    pub phone_number: String,
    pub amount: u32,
    pub expiry: NaiveDate,
}

impl Default for IssueInvoiceParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            name_katakana: String::new(),
            phone_number: String::new(),
            amount: 0,
            expiry: NaiveDate::MIN,
        }
    }
}

impl IssueInvoiceParams {
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    /// Validates against the current local date.
    pub fn errors(&self) -> ValidationErrors {
        self.errors_at(today())
    }

    pub fn errors_at(&self, today: NaiveDate) -> ValidationErrors {
        let mut errs = ValidationErrors::new();
        check_invoice_fields(
            &mut errs,
            today,
            &self.name,
            &self.name_katakana,
            &self.phone_number,
            self.amount,
            self.expiry,
        );
        errs
    }

    pub fn to_form(&self, config: &ClientConfig) -> Vec<(&'static str, String)> {
        let mut form = credentials(config, RequestType::Issue);
        form.extend([
            ("name", self.name.clone()),
            ("kana", self.name_katakana.clone()),
            ("phone_no", self.phone_number.clone()),
            ("payment", self.amount.to_string()),
            ("date_of_expiry", format_date(self.expiry)),
        ]);
        form
    }
}

/// Parameters for modifying an existing invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyInvoiceParams {
    /// Receipt number of the invoice to modify.
    pub id: String,
    pub name: String,
    pub name_katakana: String,
    pub phone_number: String,
    pub amount: u32,
    pub expiry: NaiveDate,
}

impl Default for ModifyInvoiceParams {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            name_katakana: String::new(),
            phone_number: String::new(),
            amount: 0,
            expiry: NaiveDate::MIN,
        }
    }
}

impl ModifyInvoiceParams {
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn errors(&self) -> ValidationErrors {
        self.errors_at(today())
    }

    pub fn errors_at(&self, today: NaiveDate) -> ValidationErrors {
        let mut errs = ValidationErrors::new();
        errs.check_text("id", &self.id, &ID_RULES);
        check_invoice_fields(
            &mut errs,
            today,
            &self.name,
            &self.name_katakana,
            &self.phone_number,
            self.amount,
            self.expiry,
        );
        errs
    }

    pub fn to_form(&self, config: &ClientConfig) -> Vec<(&'static str, String)> {
        let mut form = credentials(config, RequestType::Modify);
        form.extend([
            ("receipt_no", self.id.clone()),
            ("name", self.name.clone()),
            ("kana", self.name_katakana.clone()),
            ("phone_no", self.phone_number.clone()),
            ("payment", self.amount.to_string()),
            ("date_of_expiry", format_date(self.expiry)),
        ]);
        form
    }
}

/// Checks a bare receipt number, as used by cancellation.
pub fn invoice_id_errors(id: &str) -> ValidationErrors {
    let mut errs = ValidationErrors::new();
    errs.check_text("id", id, &ID_RULES);
    errs
}

/// Form fields for cancelling the invoice `id`.
pub fn cancel_form(config: &ClientConfig, id: &str) -> Vec<(&'static str, String)> {
    let mut form = credentials(config, RequestType::Cancel);
    form.push(("receipt_no", id.to_string()));
    form
}

/// Deposit state reported by a status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    /// The customer paid but the payment can still be cancelled.
    DepositMade,
    /// The customer paid and then cancelled.
    DepositCanceled,
    /// The payment is final.
    DepositFinalized,
}

impl InvoiceState {
    pub fn code(self) -> u8 {
        match self {
            InvoiceState::DepositMade => 1,
            InvoiceState::DepositCanceled => 2,
            InvoiceState::DepositFinalized => 3,
        }
    }
}

impl FromStr for InvoiceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(InvoiceState::DepositMade),
            "2" => Ok(InvoiceState::DepositCanceled),
            "3" => Ok(InvoiceState::DepositFinalized),
            other => Err(format!("unknown status code {other:?}")),
        }
    }
}

impl fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceState::DepositMade => "deposit made",
            InvoiceState::DepositCanceled => "deposit canceled",
            InvoiceState::DepositFinalized => "deposit finalized",
        };
        f.write_str(s)
    }
}

/// One entry of an inbound status notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatus {
    pub id: String,
    pub amount: u32,
    pub state: InvoiceState,
    pub updated_at: NaiveDateTime,
}
