//! Invoice operations against the remote service.
//!
//! # Design
//! `InvoiceClient` holds its `ClientConfig` and a `Transport`, and carries no
//! mutable state between calls. Each operation is split into a `build_*`
//! method that validates and encodes an `HttpRequest` and a `parse_*` method
//! that interprets the `HttpResponse`. The blocking methods (`issue_invoice`,
//! `modify_invoice`, ...) simply run build → transport → parse, so hosts that
//! do their own I/O can call the halves directly.
//!
//! Validation always happens in `build_*`; an invalid payload never reaches
//! the transport.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::codec;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse, Transport, FORM_CONTENT_TYPE, TEXT_CONTENT_TYPE};
use crate::types::{
    cancel_form, invoice_id_errors, InvoiceState, InvoiceStatus, IssueInvoiceParams,
    ModifyInvoiceParams, RequestType,
};

#[cfg(feature = "blocking")]
use crate::http::UreqTransport;

/// Timestamp layout of `receipt_date_NNNN` fields.
const RECEIPT_DATE_FORMAT: &str = "%Y%m%d%H%M";

/// Client for one invoice-issuing account.
#[derive(Debug, Clone)]
pub struct InvoiceClient<T> {
    config: ClientConfig,
    transport: T,
}

#[cfg(feature = "blocking")]
impl InvoiceClient<UreqTransport> {
    /// Creates a client that performs blocking HTTP calls with `ureq`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T> InvoiceClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn form_request(&self, kind: RequestType, fields: &[(&str, String)]) -> Result<HttpRequest, Error> {
        let body = codec::encode_form(fields)?;
        debug!(endpoint = %self.config.endpoint, request_type = ?kind, "built invoice request");
        Ok(HttpRequest::post(&self.config.endpoint, FORM_CONTENT_TYPE, body))
    }

    pub fn build_issue_invoice(&self, params: &IssueInvoiceParams) -> Result<HttpRequest, Error> {
        let errs = params.errors();
        if !errs.is_empty() {
            return Err(Error::InvalidParams(errs));
        }
        self.form_request(RequestType::Issue, &params.to_form(&self.config))
    }

    /// Returns the receipt number assigned to the new invoice.
    pub fn parse_issue_invoice(&self, response: HttpResponse) -> Result<String, Error> {
        read_line(RequestType::Issue, response)
    }

    pub fn build_modify_invoice(&self, params: &ModifyInvoiceParams) -> Result<HttpRequest, Error> {
        let errs = params.errors();
        if !errs.is_empty() {
            return Err(Error::InvalidParams(errs));
        }
        self.form_request(RequestType::Modify, &params.to_form(&self.config))
    }

    pub fn parse_modify_invoice(&self, response: HttpResponse) -> Result<(), Error> {
        read_line(RequestType::Modify, response).map(|_| ())
    }

    /// Only the receipt number is checked; there is nothing else to validate.
    pub fn build_cancel_invoice(&self, id: &str) -> Result<HttpRequest, Error> {
        let errs = invoice_id_errors(id);
        if !errs.is_empty() {
            return Err(Error::InvalidParams(errs));
        }
        self.form_request(RequestType::Cancel, &cancel_form(&self.config, id))
    }

    pub fn parse_cancel_invoice(&self, response: HttpResponse) -> Result<(), Error> {
        read_line(RequestType::Cancel, response).map(|_| ())
    }

    /// Acknowledgements are CRLF-joined receipt numbers sent as plain text,
    /// without credentials.
    pub fn build_ack_invoice_statuses<S: AsRef<str>>(&self, ids: &[S]) -> Result<HttpRequest, Error> {
        let text = ids.iter().map(|s| s.as_ref()).collect::<Vec<&str>>().join("\r\n");
        let body = codec::encode_shift_jis(&text)?;
        debug!(endpoint = %self.config.endpoint, count = ids.len(), "built acknowledgement");
        Ok(HttpRequest::post(&self.config.endpoint, TEXT_CONTENT_TYPE, body))
    }

    pub fn parse_ack_invoice_statuses(&self, response: HttpResponse) -> Result<(), Error> {
        if response.status == 200 {
            return Ok(());
        }
        warn!(status = response.status, "acknowledgement rejected");
        Err(Error::Server {
            status: response.status,
            body: codec::decode_shift_jis_lossy(&response.body),
        })
    }

    /// Parses a status notification posted by the service, given its raw
    /// urlencoded body.
    ///
    /// Credentials are checked before any malformed field is reported, so a
    /// sender with the wrong credentials always gets `Error::Unauthorized`.
    pub fn parse_invoice_statuses(&self, body: &[u8]) -> Result<Vec<InvoiceStatus>, Error> {
        let mut fields = Vec::new();
        let mut malformed = None;
        for pair in codec::decode_form_pairs(body) {
            match pair {
                Ok(field) => fields.push(field),
                Err(e) => {
                    malformed.get_or_insert(e);
                }
            }
        }
        let form = first_values(fields);
        self.check_credentials(&form)?;
        if let Some(e) = malformed {
            warn!(error = %e, "rejecting status notification");
            return Err(Error::InvalidRequest(e.to_string()));
        }
        parse_statuses(&form)
    }

    /// Parses a status notification whose form fields were already decoded
    /// by the host's web framework. When a key repeats, the first value wins.
    ///
    /// Either every entry parses or the whole batch is rejected.
    pub fn parse_invoice_statuses_from_fields<I, K, V>(&self, fields: I) -> Result<Vec<InvoiceStatus>, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let form = first_values(fields);
        self.check_credentials(&form)?;
        parse_statuses(&form)
    }

    fn check_credentials(&self, form: &HashMap<String, String>) -> Result<(), Error> {
        if field(form, "login_user_id") != self.config.user_id
            || field(form, "login_password") != self.config.password
        {
            warn!(user_id = field(form, "login_user_id"), "status notification with wrong credentials");
            return Err(Error::Unauthorized);
        }
        Ok(())
    }
}

impl<T: Transport> InvoiceClient<T> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        debug!(url = %request.url, bytes = request.body.len(), "sending request");
        self.transport.execute(&request)
    }

    /// Validates, sends, and returns the new invoice's receipt number.
    pub fn issue_invoice(&self, params: &IssueInvoiceParams) -> Result<String, Error> {
        let request = self.build_issue_invoice(params)?;
        self.parse_issue_invoice(self.send(request)?)
    }

    pub fn modify_invoice(&self, params: &ModifyInvoiceParams) -> Result<(), Error> {
        let request = self.build_modify_invoice(params)?;
        self.parse_modify_invoice(self.send(request)?)
    }

    pub fn cancel_invoice(&self, id: &str) -> Result<(), Error> {
        let request = self.build_cancel_invoice(id)?;
        self.parse_cancel_invoice(self.send(request)?)
    }

    /// Confirms receipt of the given status notifications.
    pub fn ack_invoice_statuses<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), Error> {
        let request = self.build_ack_invoice_statuses(ids)?;
        self.parse_ack_invoice_statuses(self.send(request)?)
    }
}

fn read_line(kind: RequestType, response: HttpResponse) -> Result<String, Error> {
    codec::read_single_line(response.status, &response.body).inspect_err(|e| {
        if let Error::Server { status, .. } = e {
            warn!(request_type = ?kind, status, "invoice request rejected");
        }
    })
}

fn first_values<I, K, V>(fields: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut form = HashMap::new();
    for (key, value) in fields {
        form.entry(key.into()).or_insert_with(|| value.into());
    }
    form
}

fn parse_statuses(form: &HashMap<String, String>) -> Result<Vec<InvoiceStatus>, Error> {
    let count: usize = field(form, "number_of_notify")
        .parse()
        .map_err(|_| invalid("number_of_notify"))?;

    let mut statuses = Vec::with_capacity(count.min(form.len()));
    for i in 0..count {
        statuses.push(parse_status_at(form, i).inspect_err(|e| {
            warn!(index = i, error = %e, "rejecting status notification");
        })?);
    }
    debug!(count, "parsed status notification");
    Ok(statuses)
}

fn invalid(name: &str) -> Error {
    Error::InvalidRequest(format!("missing or malformed {name}"))
}

/// Missing fields read as empty.
fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or("")
}

fn parse_status_at(form: &HashMap<String, String>, i: usize) -> Result<InvoiceStatus, Error> {
    let id_key = format!("receipt_no_{i:04}");
    let id = field(form, &id_key);
    if id.is_empty() {
        return Err(invalid(&id_key));
    }

    let amount_key = format!("payment_{i:04}");
    let amount = field(form, &amount_key).parse().map_err(|_| invalid(&amount_key))?;

    let state_key = format!("status_{i:04}");
    let state: InvoiceState = field(form, &state_key).parse().map_err(|_| invalid(&state_key))?;

    let date_key = format!("receipt_date_{i:04}");
    let raw_date = field(form, &date_key);
    if raw_date.len() != 12 || !raw_date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(&date_key));
    }
    let updated_at =
        NaiveDateTime::parse_from_str(raw_date, RECEIPT_DATE_FORMAT).map_err(|_| invalid(&date_key))?;

    Ok(InvoiceStatus {
        id: id.to_string(),
        amount,
        state,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::{Days, Local, NaiveDate};

    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("http://localhost:3000/api", "issuer", "secret")
    }

    fn with<F>(transport: F) -> InvoiceClient<F>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, Error>,
    {
        InvoiceClient::with_transport(config(), transport)
    }

    fn client() -> InvoiceClient<impl Fn(&HttpRequest) -> Result<HttpResponse, Error>> {
        with(|_| panic!("no request expected"))
    }

    fn ok(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        }
    }

    fn tomorrow() -> NaiveDate {
        Local::now().date_naive() + Days::new(1)
    }

    fn issue_params() -> IssueInvoiceParams {
        IssueInvoiceParams {
            name: "松本行弘".to_string(),
            name_katakana: "マツモトヒロユキ".to_string(),
            phone_number: "0120-444-444".to_string(),
            amount: 100,
            expiry: tomorrow(),
        }
    }

    fn modify_params() -> ModifyInvoiceParams {
        ModifyInvoiceParams {
            id: "invoice-1234".to_string(),
            name: "松本行弘".to_string(),
            name_katakana: "マツモトヒロユキ".to_string(),
            phone_number: "0120-444-444".to_string(),
            amount: 100,
            expiry: tomorrow(),
        }
    }

    fn notification(count: &str) -> Vec<(String, String)> {
        let mut fields = vec![
            ("login_user_id".to_string(), "issuer".to_string()),
            ("login_password".to_string(), "secret".to_string()),
            ("number_of_notify".to_string(), count.to_string()),
        ];
        for i in 0..3 {
            fields.extend([
                (format!("receipt_no_{i:04}"), format!("invoice-{}", i + 1)),
                (format!("payment_{i:04}"), format!("{}", 101 + i)),
                (format!("status_{i:04}"), format!("{}", i + 1)),
                (format!("receipt_date_{i:04}"), "201502082010".to_string()),
            ]);
        }
        fields
    }

    fn set(fields: &mut [(String, String)], key: &str, value: &str) {
        let slot = fields.iter_mut().find(|(k, _)| k == key).unwrap();
        slot.1 = value.to_string();
    }

    #[test]
    fn invalid_issue_params_never_reach_transport() {
        let err = client().issue_invoice(&IssueInvoiceParams::default()).unwrap_err();
        match err {
            Error::InvalidParams(errs) => assert_eq!(errs.len(), 5),
            other => panic!("expected InvalidParams, got {other:?}"),
        }
    }

    #[test]
    fn invalid_modify_params_never_reach_transport() {
        let err = client().modify_invoice(&ModifyInvoiceParams::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(ref errs) if errs.get("id").is_some()));
    }

    #[test]
    fn cancel_requires_only_an_id() {
        let err = client().cancel_invoice("").unwrap_err();
        match err {
            Error::InvalidParams(errs) => {
                assert_eq!(errs.len(), 1);
                assert!(errs.get("id").is_some());
            }
            other => panic!("expected InvalidParams, got {other:?}"),
        }
    }

    #[test]
    fn build_issue_invoice_produces_form_request() {
        let req = client().build_issue_invoice(&issue_params()).unwrap();
        assert_eq!(req.url, "http://localhost:3000/api");
        assert_eq!(req.content_type(), Some(FORM_CONTENT_TYPE));
        let body = String::from_utf8(req.body).unwrap();
        assert!(body.starts_with("login_user_id=issuer&login_password=secret&regist_type=1&"));
        // マ is 0x83 0x7D in Shift-JIS
        assert!(body.contains("kana=%83%7D"), "{body}");
        assert!(body.contains("payment=100"));
    }

    #[test]
    fn issue_returns_single_line_verbatim() {
        let sent = RefCell::new(Vec::new());
        let client = with(|req| {
            sent.borrow_mut().push(req.clone());
            Ok(ok("invoice-1234"))
        });
        assert_eq!(client.issue_invoice(&issue_params()).unwrap(), "invoice-1234");
        assert_eq!(sent.borrow().len(), 1);
    }

    #[test]
    fn issue_multi_line_response_is_an_error() {
        let client = with(|_| Ok(ok("-1\nerror message")));
        match client.issue_invoice(&issue_params()).unwrap_err() {
            Error::Server { body, .. } => assert!(body.contains("-1\nerror message")),
            other => panic!("expected Server, got {other:?}"),
        }
    }

    #[test]
    fn transport_failure_is_surfaced() {
        let client = with(|_| {
            Err(Error::Transport("connection refused".to_string()))
        });
        assert!(matches!(client.issue_invoice(&issue_params()), Err(Error::Transport(_))));
    }

    #[test]
    fn unmappable_name_fails_before_sending() {
        let params = IssueInvoiceParams {
            name: "Ruby 💎".to_string(),
            ..issue_params()
        };
        assert!(matches!(client().issue_invoice(&params), Err(Error::Encoding(_))));
    }

    #[test]
    fn modify_and_cancel_accept_single_line() {
        let client = with(|_| Ok(ok("invoice-1234")));
        client.modify_invoice(&modify_params()).unwrap();
        client.cancel_invoice("invoice-1234").unwrap();
    }

    #[test]
    fn cancel_request_carries_type_nine() {
        let req = client().build_cancel_invoice("invoice-1234").unwrap();
        assert_eq!(
            req.body,
            b"login_user_id=issuer&login_password=secret&regist_type=9&receipt_no=invoice-1234"
        );
    }

    #[test]
    fn modify_non_200_is_server_error() {
        let client = with(|_| {
            Ok(HttpResponse {
                status: 503,
                body: b"maintenance".to_vec(),
            })
        });
        let err = client.modify_invoice(&modify_params()).unwrap_err();
        assert!(matches!(err, Error::Server { status: 503, .. }));
    }

    #[test]
    fn ack_joins_ids_with_crlf() {
        let req = client().build_ack_invoice_statuses(&["1", "2", "3"]).unwrap();
        assert_eq!(req.body, b"1\r\n2\r\n3");
        assert_eq!(req.content_type(), Some(TEXT_CONTENT_TYPE));
    }

    #[test]
    fn ack_succeeds_on_any_200() {
        let client = with(|_| Ok(ok("whatever\nlines")));
        client.ack_invoice_statuses(&["invoice-1", "invoice-2"]).unwrap();
    }

    #[test]
    fn ack_non_200_is_server_error() {
        let r = client().parse_ack_invoice_statuses(HttpResponse {
            status: 500,
            body: Vec::new(),
        });
        assert!(matches!(r, Err(Error::Server { status: 500, .. })));
    }

    #[test]
    fn parse_statuses_in_index_order() {
        let statuses = client().parse_invoice_statuses_from_fields(notification("3")).unwrap();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].id, "invoice-1");
        assert_eq!(statuses[0].amount, 101);
        assert_eq!(statuses[0].state, InvoiceState::DepositMade);
        assert_eq!(statuses[1].state, InvoiceState::DepositCanceled);
        assert_eq!(statuses[2].id, "invoice-3");
        assert_eq!(statuses[2].state, InvoiceState::DepositFinalized);
        assert_eq!(
            statuses[2].updated_at,
            NaiveDate::from_ymd_opt(2015, 2, 8).unwrap().and_hms_opt(20, 10, 0).unwrap()
        );
    }

    #[test]
    fn count_limits_parsed_entries() {
        let statuses = client().parse_invoice_statuses_from_fields(notification("2")).unwrap();
        assert_eq!(statuses.len(), 2);
        let statuses = client().parse_invoice_statuses_from_fields(notification("0")).unwrap();
        assert!(statuses.is_empty());
    }

    #[test]
    fn wrong_credentials_are_unauthorized() {
        let mut fields = notification("3");
        set(&mut fields, "login_password", "guess");
        let err = client().parse_invoice_statuses_from_fields(fields).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));

        let err = client()
            .parse_invoice_statuses_from_fields([("login_user_id", "invalid"), ("login_password", "invalid")])
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[test]
    fn any_bad_entry_rejects_the_batch() {
        for (key, value) in [
            ("status_0001", "4"),
            ("payment_0002", "abc"),
            ("receipt_no_0000", ""),
            ("receipt_date_0001", "2015020820"),
            ("receipt_date_0002", "201513082010"),
            ("number_of_notify", "-1"),
            ("number_of_notify", "x"),
        ] {
            let mut fields = notification("3");
            set(&mut fields, key, value);
            let err = client().parse_invoice_statuses_from_fields(fields).unwrap_err();
            assert!(matches!(err, Error::InvalidRequest(_)), "{key}={value}: {err:?}");
        }
    }

    #[test]
    fn count_beyond_entries_is_invalid() {
        let err = client().parse_invoice_statuses_from_fields(notification("4")).unwrap_err();
        match err {
            Error::InvalidRequest(msg) => assert!(msg.contains("receipt_no_0003")),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn parse_statuses_from_raw_body() {
        let body = b"login_user_id=issuer&login_password=secret&number_of_notify=1\
            &receipt_no_0000=invoice-1&payment_0000=100&status_0000=3&receipt_date_0000=201502082012";
        let statuses = client().parse_invoice_statuses(body).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, InvoiceState::DepositFinalized);
    }

    #[test]
    fn malformed_raw_body_is_invalid_request() {
        let body = b"login_user_id=issuer&login_password=secret&number_of_notify=0&memo=%83";
        let err = client().parse_invoice_statuses(body).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn wrong_credentials_win_over_malformed_fields() {
        let body = b"login_user_id=issuer&login_password=guess&number_of_notify=1&junk=%83";
        let err = client().parse_invoice_statuses(body).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));

        let err = client().parse_invoice_statuses(b"login_user_id=%83").unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }
}
