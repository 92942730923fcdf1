use std::io::{Cursor, Write};

use quick_xml::events::{BytesStart, BytesText, Event};

pub use quick_xml::{events, Writer};

/// An element ready to be written.
///
/// `namespace` is emitted as a default namespace declaration whenever it
/// differs from the one in scope. Names that already carry a prefix keep the
/// enclosing default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
            ..Self::default()
        }
    }

    pub fn with_children(mut self, children: Vec<Element>) -> Self {
        self.children = children;
        self
    }

    /// Empty text is dropped.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.text = (!text.is_empty()).then_some(text);
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.attributes.is_empty() && self.children.is_empty()
    }

    fn is_prefixed(&self) -> bool {
        self.name.contains(':')
    }
}

pub trait ToXml {
    fn to_xml<W: Write>(&self, writer: &mut Writer<W>, default_namespace: Option<&str>) -> Result<(), quick_xml::Error>;
}

impl ToXml for Element {
    fn to_xml<W: Write>(&self, writer: &mut Writer<W>, default_namespace: Option<&str>) -> Result<(), quick_xml::Error> {
        let mut start = BytesStart::owned_name(self.name.as_str());

        let scope = if self.is_prefixed() {
            default_namespace
        } else {
            let namespace = self.namespace.as_deref();
            if namespace != default_namespace {
                start.push_attribute(("xmlns", namespace.unwrap_or("")));
            }
            namespace
        };

        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.text.is_none() && self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start.to_borrowed()))?;

        if let Some(text) = &self.text {
            writer.write_event(Event::Text(BytesText::from_plain_str(text)))?;
        }

        for child in &self.children {
            child.to_xml(writer, scope)?;
        }

        writer.write_event(Event::End(start.to_end()))?;
        Ok(())
    }
}

/// Writes `element` without an XML declaration.
pub fn to_string<T: ToXml>(element: &T) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    element.to_xml(&mut writer, None)?;
    Ok(String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned())
}
