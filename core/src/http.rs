//! HTTP transport types and the blocking transport seam.
//!
//! # Design
//! Requests and responses are plain data. `InvoiceClient` builds an
//! `HttpRequest`, hands it to a `Transport`, and parses the `HttpResponse`
//! it gets back. Bodies are raw bytes because both directions carry
//! Shift-JIS. Every request to the service is a POST, so no method field is
//! carried.
//!
//! Any `Fn(&HttpRequest) -> Result<HttpResponse, Error>` is a transport,
//! which lets hosts and tests plug in their own I/O. `UreqTransport` is the
//! stock implementation behind the `blocking` feature.

use crate::error::Error;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// A POST request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn post(url: &str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            url: url.to_string(),
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Executes one HTTP round-trip. Non-2xx statuses are data, not errors;
/// only network-level failures return `Err`, as `Error::Transport`.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

impl<F> Transport for F
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, Error>,
{
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        self(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
#[cfg(feature = "blocking")]
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

#[cfg(feature = "blocking")]
impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

#[cfg(feature = "blocking")]
impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "blocking")]
impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let mut builder = self.agent.post(&request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        let mut response = builder
            .send(&request.body[..])
            .map_err(|e| Error::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_sets_content_type() {
        let req = HttpRequest::post("http://x/", TEXT_CONTENT_TYPE, b"1".to_vec());
        assert_eq!(req.content_type(), Some("text/plain"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn closures_are_transports() {
        let transport = |req: &HttpRequest| -> Result<HttpResponse, Error> {
            Ok(HttpResponse {
                status: 200,
                body: req.body.clone(),
            })
        };
        let req = HttpRequest::post("http://x/", TEXT_CONTENT_TYPE, b"echo".to_vec());
        assert_eq!(transport.execute(&req).unwrap().body, b"echo");
    }
}
