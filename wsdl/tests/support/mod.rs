#![allow(dead_code)]

use bytes::Bytes;
use std::{path::PathBuf, sync::Mutex};

use lather_util::transport::{Request, Transport, TransportError};

pub fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("support")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).unwrap()
}

/// Records every request and answers each with the same canned response.
pub struct Recording {
    pub requests: Mutex<Vec<Request>>,
    status: u16,
    body: String,
}

impl Recording {
    pub fn answering(status: u16, body: impl Into<String>) -> Self {
        Self {
            requests: Mutex::default(),
            status,
            body: body.into(),
        }
    }

    pub fn last(&self) -> Request {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    pub fn last_body(&self) -> String {
        String::from_utf8(self.last().body).unwrap()
    }
}

impl Transport for Recording {
    fn send(&self, request: Request) -> Result<Bytes, TransportError> {
        self.requests.lock().unwrap().push(request);
        match self.status {
            200 => Ok(Bytes::from(self.body.clone())),
            status => Err(TransportError::status(status, self.body.clone())),
        }
    }
}

pub fn envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#,
            "<soap:Body>{}</soap:Body></soap:Envelope>"
        ),
        body
    )
}
