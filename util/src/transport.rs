use bytes::Bytes;
use reqwest::blocking::Client as Reqwest;
use std::{error::Error as StdError, fmt, sync::Arc};

/// A fully formatted SOAP request, ready to be handed to a [`Transport`].
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Failure reported by a transport.
///
/// Carries the HTTP status and response body when the server answered, so
/// that a SOAP Fault hidden in an error response can still be surfaced.
#[derive(Debug)]
pub struct TransportError {
    status: Option<u16>,
    body: Option<Bytes>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    pub fn status(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status: Some(status),
            body: Some(body.into()),
            source: None,
        }
    }

    pub fn other<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self {
            status: None,
            body: None,
            source: Some(Box::new(err)),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// 202 Accepted and 204 No Content both mean the call succeeded without a reply.
    pub fn is_no_content(&self) -> bool {
        matches!(self.status, Some(202) | Some(204))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.status, &self.source) {
            (Some(status), _) => write!(f, "Server responded with HTTP status {}", status),
            (None, Some(source)) => write!(f, "Transport failed: {}", source),
            (None, None) => write!(f, "Transport failed"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub trait Transport {
    fn send(&self, request: Request) -> Result<Bytes, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: Request) -> Result<Bytes, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: Request) -> Result<Bytes, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: Request) -> Result<Bytes, TransportError> {
        (**self).send(request)
    }
}

/// Blocking HTTP transport. Non-2xx responses become [`TransportError`]s carrying the body.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: Reqwest,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Reqwest) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> Result<Bytes, TransportError> {
        let method =
            reqwest::Method::from_bytes(request.method.as_bytes()).map_err(TransportError::other)?;

        let mut builder = self
            .client
            .request(method, request.url.as_str())
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(TransportError::other)?;
        let status = response.status();
        let body = response.bytes().map_err(TransportError::other)?;

        log::debug!("{} responded with {}", request.url, status);

        if status.is_success() && status.as_u16() != 202 && status.as_u16() != 204 {
            Ok(body)
        } else {
            Err(TransportError::status(status.as_u16(), body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_content_statuses() {
        assert!(TransportError::status(202, Bytes::new()).is_no_content());
        assert!(TransportError::status(204, Bytes::new()).is_no_content());
        assert!(!TransportError::status(500, Bytes::new()).is_no_content());
    }

    #[test]
    fn source_chain_is_kept() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::other(io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let request = Request {
            method: "POST".to_owned(),
            url: "http://localhost/".to_owned(),
            headers: vec![("SOAPAction".to_owned(), "urn:go".to_owned())],
            body: Vec::new(),
        };
        assert_eq!(request.header("soapaction"), Some("urn:go"));
    }
}
