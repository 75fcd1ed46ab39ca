use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use encoding_rs::SHIFT_JIS;
use percent_encoding::percent_decode;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};

const SJIS_TEXT: &str = "text/plain; charset=Shift_JIS";

type SjisResponse = (StatusCode, [(header::HeaderName, &'static str); 1], Vec<u8>);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invoice {
    pub receipt_no: String,
    pub name: String,
    pub kana: String,
    pub phone_no: String,
    pub payment: u32,
    pub date_of_expiry: String,
    pub canceled: bool,
}

/// Account the mock accepts requests for.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub user_id: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user_id: "test-user".to_string(),
            password: "test-password".to_string(),
        }
    }
}

pub struct Store {
    credentials: Credentials,
    next_receipt: AtomicU64,
    invoices: RwLock<HashMap<String, Invoice>>,
    acks: RwLock<Vec<String>>,
}

pub type Db = Arc<Store>;

pub fn app() -> Router {
    app_with(Credentials::default())
}

pub fn app_with(credentials: Credentials) -> Router {
    let db: Db = Arc::new(Store {
        credentials,
        next_receipt: AtomicU64::new(1),
        invoices: RwLock::new(HashMap::new()),
        acks: RwLock::new(Vec::new()),
    });
    Router::new()
        .route("/", post(handle_post))
        .route("/invoices/{id}", get(get_invoice))
        .route("/acks", get(list_acks))
        .with_state(db)
}

pub async fn run(listener: TcpListener, credentials: Credentials) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(credentials)).await
}

/// Shift-JIS encodes `text`, replacing anything unmappable.
fn sjis(text: &str) -> Vec<u8> {
    SHIFT_JIS.encode(text).0.into_owned()
}

fn reply(text: &str) -> SjisResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, SJIS_TEXT)], sjis(text))
}

/// The service reports failures as a 200 with a multi-line body.
fn reject(message: &str) -> SjisResponse {
    warn!(message, "rejecting request");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, SJIS_TEXT)],
        sjis(&format!("-1\r\n{message}")),
    )
}

/// Decodes an urlencoded body whose escapes are Shift-JIS bytes.
///
/// Kept separate from the client codec so the server stays an independent
/// implementation of the wire format.
pub fn decode_form(body: &[u8]) -> Option<HashMap<String, String>> {
    let decode = |raw: &[u8]| -> Option<String> {
        let spaced: Vec<u8> = raw.iter().map(|b| if *b == b'+' { b' ' } else { *b }).collect();
        let bytes: Vec<u8> = percent_decode(&spaced).collect();
        SHIFT_JIS
            .decode_without_bom_handling_and_without_replacement(&bytes)
            .map(|s| s.into_owned())
    };
    let mut form = HashMap::new();
    for pair in body.split(|b| *b == b'&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.iter().position(|b| *b == b'=') {
            Some(i) => (&pair[..i], &pair[i + 1..]),
            None => (pair, &[][..]),
        };
        form.entry(decode(key)?).or_insert(decode(value)?);
    }
    Some(form)
}

async fn handle_post(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> SjisResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("text/plain") {
        let text = SHIFT_JIS.decode_without_bom_handling(&body).0.into_owned();
        let ids: Vec<String> = text
            .split("\r\n")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        info!(count = ids.len(), "acknowledged");
        db.acks.write().await.extend(ids);
        return (StatusCode::OK, [(header::CONTENT_TYPE, SJIS_TEXT)], Vec::new());
    }

    let Some(form) = decode_form(&body) else {
        return reject("リクエストの文字コードが不正です");
    };
    if field(&form, "login_user_id") != db.credentials.user_id
        || field(&form, "login_password") != db.credentials.password
    {
        return reject("認証に失敗しました");
    }

    match field(&form, "regist_type") {
        "1" => {
            let Some(mut invoice) = invoice_from_form(&form) else {
                return reject("入力内容が不正です");
            };
            let n = db.next_receipt.fetch_add(1, Ordering::SeqCst);
            invoice.receipt_no = format!("{n:010}");
            info!(receipt_no = %invoice.receipt_no, "issued invoice");
            let receipt_no = invoice.receipt_no.clone();
            db.invoices.write().await.insert(receipt_no.clone(), invoice);
            reply(&receipt_no)
        }
        "2" => {
            let Some(mut update) = invoice_from_form(&form) else {
                return reject("入力内容が不正です");
            };
            let mut invoices = db.invoices.write().await;
            match invoices.get_mut(field(&form, "receipt_no")) {
                Some(existing) if !existing.canceled => {
                    update.receipt_no = existing.receipt_no.clone();
                    *existing = update;
                    info!(receipt_no = %existing.receipt_no, "modified invoice");
                    reply(&existing.receipt_no)
                }
                _ => reject("受付番号が不正です"),
            }
        }
        "9" => {
            let mut invoices = db.invoices.write().await;
            match invoices.get_mut(field(&form, "receipt_no")) {
                Some(existing) if !existing.canceled => {
                    existing.canceled = true;
                    info!(receipt_no = %existing.receipt_no, "canceled invoice");
                    reply(&existing.receipt_no)
                }
                _ => reject("受付番号が不正です"),
            }
        }
        _ => reject("登録区分が不正です"),
    }
}

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or("")
}

fn invoice_from_form(form: &HashMap<String, String>) -> Option<Invoice> {
    let field = |name: &str| form.get(name).filter(|v| !v.is_empty()).cloned();
    let date_of_expiry = field("date_of_expiry")?;
    if date_of_expiry.len() != 8 || !date_of_expiry.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(Invoice {
        receipt_no: String::new(),
        name: field("name")?,
        kana: field("kana")?,
        phone_no: field("phone_no")?,
        payment: field("payment")?.parse().ok()?,
        date_of_expiry,
        canceled: false,
    })
}

async fn get_invoice(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, StatusCode> {
    let invoices = db.invoices.read().await;
    invoices.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn list_acks(State(db): State<Db>) -> Json<Vec<String>> {
    Json(db.acks.read().await.clone())
}
