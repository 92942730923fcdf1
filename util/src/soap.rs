use bytes::Bytes;
use roxmltree::{Document, Node};
use std::{fmt, io::Cursor, io::Write, sync::Arc};

use crate::{
    error::Error,
    message::{Args, InputMessage, OutputMessage, Reply},
    ns,
    transport::{HttpTransport, Request, Transport, TransportError},
    types::{Registry, TypeId},
    value::{Arg, Instance},
    xml::{events::BytesStart, events::Event, Element, ToXml, Writer},
};

/// One callable operation of a service.
#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    pub location: String,
    pub name: String,
    pub action: String,
    pub input: InputMessage,
    pub output: OutputMessage,
}

/// A SOAP Fault returned by a server.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fault {
    pub method_location: String,
    pub method_name: String,
    pub faultcode: Option<String>,
    pub faultstring: Option<String>,
    pub detail: Option<String>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SOAP Fault {}:{} <{}> {}",
            self.method_location,
            self.method_name,
            self.faultcode.as_deref().unwrap_or_default(),
            self.faultstring.as_deref().unwrap_or_default(),
        )?;

        match &self.detail {
            Some(detail) => write!(f, ": {}", detail),
            None => Ok(()),
        }
    }
}

impl std::error::Error for Fault {}

#[derive(Debug)]
pub struct Envelope {
    header: Vec<Element>,
    body: Vec<Element>,
}

impl Envelope {
    pub fn new(body: Vec<Element>) -> Self {
        Self {
            header: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, header: Vec<Element>) -> Self {
        self.header = header;
        self
    }

    pub fn to_request(&self) -> Result<Vec<u8>, quick_xml::Error> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.to_xml(&mut writer, None)?;
        Ok(writer.into_inner().into_inner())
    }
}

impl ToXml for Envelope {
    fn to_xml<W: Write>(&self, writer: &mut Writer<W>, default_namespace: Option<&str>) -> Result<(), quick_xml::Error> {
        let mut envelope = BytesStart::owned_name("soap-env:Envelope");
        for (prefix, uri) in ns::ENVELOPE_PREFIXES {
            envelope.push_attribute((format!("xmlns:{}", prefix).as_str(), uri));
        }

        writer.write_event(Event::Start(envelope.to_borrowed()))?;

        if !self.header.is_empty() {
            let header = BytesStart::owned_name("soap-env:Header");
            writer.write_event(Event::Start(header.to_borrowed()))?;
            for element in &self.header {
                element.to_xml(writer, default_namespace)?;
            }
            writer.write_event(Event::End(header.to_end()))?;
        }

        let body = BytesStart::owned_name("soap-env:Body");
        writer.write_event(Event::Start(body.to_borrowed()))?;
        for element in &self.body {
            element.to_xml(writer, default_namespace)?;
        }
        writer.write_event(Event::End(body.to_end()))?;

        writer.write_event(Event::End(envelope.to_end()))?;
        Ok(())
    }
}

fn is_envelope_namespace(node: Node) -> bool {
    matches!(node.tag_name().namespace(), Some(ns::SOAP_ENV) | Some(ns::SOAP12_ENV))
}

fn envelope_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name && is_envelope_namespace(*child))
}

fn child_by_local<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
}

fn trimmed_text(node: Node) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

/// Reads a Fault out of `body`, if there is one. SOAP 1.2 nests the code and
/// reason one level deeper than SOAP 1.1.
pub fn find_fault(method: &Method, body: Node, source: &str) -> Option<Fault> {
    let fault = envelope_child(body, "Fault")?;

    let faultcode = child_by_local(fault, "faultcode")
        .or_else(|| child_by_local(fault, "Code").and_then(|code| child_by_local(code, "Value")))
        .and_then(trimmed_text);

    let faultstring = child_by_local(fault, "faultstring")
        .or_else(|| child_by_local(fault, "Reason").and_then(|reason| child_by_local(reason, "Text")))
        .and_then(trimmed_text);

    let detail = child_by_local(fault, "detail")
        .or_else(|| child_by_local(fault, "Detail"))
        .map(|detail| trimmed_text(detail).unwrap_or_else(|| source[detail.range()].to_owned()));

    Some(Fault {
        method_location: method.location.clone(),
        method_name: method.name.clone(),
        faultcode,
        faultstring,
        detail,
    })
}

fn find_body<'a, 'input>(document: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    let envelope = document.root_element();
    if envelope.tag_name().name() != "Envelope" || !is_envelope_namespace(envelope) {
        return None;
    }

    envelope_child(envelope, "Body")
}

/// A dynamic SOAP client: a registry, the methods it can call, and a transport.
#[derive(Debug)]
pub struct Client<T = HttpTransport> {
    registry: Arc<Registry>,
    methods: Vec<Method>,
    transport: T,
}

impl<T: Transport> Client<T> {
    pub fn new(registry: impl Into<Arc<Registry>>, methods: Vec<Method>, transport: T) -> Self {
        Self {
            registry: registry.into(),
            methods,
            transport,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn method(&self, name: &str) -> Result<&Method, Error> {
        self.methods
            .iter()
            .find(|method| method.name == name)
            .ok_or_else(|| Error::UnknownMethod(name.to_owned()))
    }

    pub fn type_id(&self, name: &str) -> Result<TypeId, Error> {
        self.registry.require(name)
    }

    /// Builds a value of the named type.
    pub fn instance(&self, type_name: &str, arg: impl Into<Arg>) -> Result<Instance, Error> {
        Instance::new(&self.registry, self.type_id(type_name)?, arg)
    }

    /// An empty value of the named complex type.
    pub fn empty(&self, type_name: &str) -> Result<Instance, Error> {
        let id = self.type_id(type_name)?;
        Instance::empty(&self.registry, id)?.ok_or_else(|| Error::Mismatch {
            from: "record",
            to: type_name.to_owned(),
        })
    }

    /// Calls `name` with `args`, returning its reply or a [`Fault`].
    pub fn call(&self, name: &str, args: Args) -> Result<Reply, Error> {
        let method = self.method(name)?;
        let request = self.format_request(method, args)?;

        log::trace!("Sending {} to {}", method.name, method.location);
        match self.transport.send(request) {
            Ok(response) => self.handle_response(method, &response),
            Err(err) if err.is_no_content() => Ok(Reply::Empty),
            Err(err) => Err(self.handle_error(method, err)),
        }
    }

    pub fn format_request(&self, method: &Method, args: Args) -> Result<Request, Error> {
        let formatted = method.input.format(&self.registry, args)?;
        let envelope = Envelope::new(formatted.body(&self.registry)?)
            .with_header(formatted.header(&self.registry)?);

        let body = envelope.to_request()?;
        log::debug!("Request: {}", String::from_utf8_lossy(&body));

        Ok(Request {
            method: "POST".to_owned(),
            url: method.location.clone(),
            headers: vec![
                ("Content-Type".to_owned(), "text/xml".to_owned()),
                ("SOAPAction".to_owned(), method.action.clone()),
            ],
            body,
        })
    }

    /// Unmarshals a successful response, raising any Fault it carries.
    pub fn handle_response(&self, method: &Method, response: &[u8]) -> Result<Reply, Error> {
        if response.iter().all(u8::is_ascii_whitespace) {
            return Ok(Reply::Empty);
        }

        let text = std::str::from_utf8(response)?;
        log::debug!("Response: {}", text);

        let document = Document::parse(text)?;
        let body = find_body(&document).ok_or_else(|| Error::NotSoap {
            message: "Response is not a SOAP envelope".to_owned(),
            response: text.to_owned(),
        })?;

        if let Some(fault) = find_fault(method, body, text) {
            return Err(fault.into());
        }

        let header = body
            .parent_element()
            .and_then(|envelope| envelope_child(envelope, "Header"));

        match body.children().find(Node::is_element) {
            Some(root) => method.output.parse(&self.registry, root, header),
            None => Ok(Reply::Empty),
        }
    }

    /// Surfaces a Fault carried in an error response, or else the transport error itself.
    pub fn handle_error(&self, method: &Method, err: TransportError) -> Error {
        if let Some(fault) = err.body().and_then(|body| probe_fault(method, body)) {
            return fault.into();
        }

        err.into()
    }
}

fn probe_fault(method: &Method, body: &Bytes) -> Option<Fault> {
    let text = std::str::from_utf8(body).ok()?;
    let document = Document::parse(text).ok()?;
    let body = find_body(&document)?;
    find_fault(method, body, text)
}
