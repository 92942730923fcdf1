use roxmltree::Node;
use std::{collections::BTreeMap, str::FromStr};

use crate::{
    error::Error,
    ns,
    types::{Registry, TypeRef},
    value::{Arg, Instance},
    xml::Element,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    Document,
    Rpc,
}

impl FromStr for Style {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "document" => Ok(Self::Document),
            "rpc" => Ok(Self::Rpc),
            other => Err(other.to_owned()),
        }
    }
}

/// A named message part and its type.
#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub name: String,
    pub ty: TypeRef,
}

impl Part {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// How an input message lays its parts out in the SOAP body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Formatter {
    /// The single part is itself the operation element.
    DocumentLiteralWrapper,
    /// Each part is a body child of its own.
    DocumentLiteral,
    /// Parts wrapped in an element named after the operation.
    RpcLiteral,
    /// As [`Formatter::RpcLiteral`], with `xsi:type` on every part.
    RpcEncoded,
}

/// Arguments to a call: positional values first, then named ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Arg>,
    pub named: Vec<(String, Arg)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Arg>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    fn take(&mut self, name: &str) -> Option<Arg> {
        let index = self.named.iter().position(|(key, _)| key == name)?;
        Some(self.named.remove(index).1)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputMessage {
    pub tag: String,
    pub namespace: Option<String>,
    pub parts: Vec<Part>,
    pub style: Style,
    pub literal: bool,
    pub headers: Vec<Part>,
    formatter: Formatter,
}

impl InputMessage {
    pub fn new(
        registry: &Registry,
        tag: impl Into<String>,
        namespace: Option<String>,
        parts: Vec<Part>,
        style: Style,
        literal: bool,
        headers: Vec<Part>,
    ) -> Result<Self, Error> {
        let tag = tag.into();

        let formatter = match (style, literal) {
            (Style::Rpc, true) => Formatter::RpcLiteral,
            (Style::Rpc, false) => Formatter::RpcEncoded,
            (Style::Document, _) => {
                let wrapper = match parts.as_slice() {
                    [part] => {
                        let id = registry.resolve(&part.ty)?;
                        registry.descriptor(id)?.tag.as_deref() == Some(tag.as_str())
                    }
                    _ => false,
                };

                if !literal {
                    log::warn!("{} is document/encoded, formatting it as literal", tag);
                }

                if wrapper {
                    Formatter::DocumentLiteralWrapper
                } else {
                    Formatter::DocumentLiteral
                }
            }
        };

        Ok(Self {
            tag,
            namespace,
            parts,
            style,
            literal,
            headers,
            formatter,
        })
    }

    pub fn formatter(&self) -> Formatter {
        self.formatter
    }

    /// Binds call arguments to parts and headers.
    pub fn format(&self, registry: &Registry, mut args: Args) -> Result<Formatted, Error> {
        let mut headers = Vec::new();
        for header in &self.headers {
            let ty = registry.resolve(&header.ty)?;

            if let Some(value) = args.take(&header.name) {
                headers.push((header.name.clone(), Instance::new(registry, ty, value)?));
            }

            if let Some(complex) = registry.descriptor(ty)?.complex() {
                let fields: Vec<_> = complex
                    .children
                    .iter()
                    .chain(&complex.attributes)
                    .filter_map(|field| args.take(&field.name).map(|value| (field.name.clone(), value)))
                    .collect();

                if !fields.is_empty() {
                    headers.push((header.name.clone(), Instance::new(registry, ty, Arg::Record(fields))?));
                }
            }
        }

        let missing = |part: &Part| Error::MissingArgument {
            method: self.tag.clone(),
            part: part.name.clone(),
        };

        let mut parts = Vec::with_capacity(self.parts.len());
        let mut positional = std::mem::take(&mut args.positional).into_iter();

        if let [part] = self.parts.as_slice() {
            let ty = registry.resolve(&part.ty)?;
            let complex = registry.descriptor(ty)?.complex().is_some();

            let mut value = match positional.next().or_else(|| args.take(&part.name)) {
                Some(arg) => Instance::new(registry, ty, arg)?,
                None if complex => Instance::new(registry, ty, Arg::Record(Vec::new()))?,
                None => return Err(missing(part)),
            };

            for (name, arg) in args.named.drain(..) {
                value.set(registry, &name, arg)?;
            }

            parts.push((part.name.clone(), value));
        } else {
            for part in &self.parts {
                let ty = registry.resolve(&part.ty)?;
                let arg = positional
                    .next()
                    .or_else(|| args.take(&part.name))
                    .ok_or_else(|| missing(part))?;
                parts.push((part.name.clone(), Instance::new(registry, ty, arg)?));
            }

            for (name, _) in &args.named {
                log::debug!("Ignoring argument {} to {}", name, self.tag);
            }
        }

        Ok(Formatted {
            formatter: self.formatter,
            tag: self.tag.clone(),
            namespace: self.namespace.clone(),
            parts,
            headers,
        })
    }
}

/// An input message with its arguments bound, ready to render.
#[derive(Clone, Debug, PartialEq)]
pub struct Formatted {
    pub formatter: Formatter,
    pub tag: String,
    pub namespace: Option<String>,
    pub parts: Vec<(String, Instance)>,
    pub headers: Vec<(String, Instance)>,
}

impl Formatted {
    pub fn header(&self, registry: &Registry) -> Result<Vec<Element>, Error> {
        let mut elements = Vec::new();
        for (name, value) in &self.headers {
            elements.extend(value.to_xml(registry, Some(name), false)?);
        }

        Ok(elements)
    }

    pub fn body(&self, registry: &Registry) -> Result<Vec<Element>, Error> {
        match self.formatter {
            Formatter::DocumentLiteralWrapper => {
                let mut elements = Vec::new();
                for (_, value) in self.parts.iter().take(1) {
                    elements.extend(value.to_xml(registry, None, true)?);
                }
                Ok(elements)
            }
            Formatter::DocumentLiteral => {
                let mut elements = Vec::new();
                for (_, value) in &self.parts {
                    elements.extend(value.to_xml(registry, None, true)?);
                }
                Ok(elements)
            }
            Formatter::RpcLiteral | Formatter::RpcEncoded => {
                let encoded = self.formatter == Formatter::RpcEncoded;
                let mut wrapper = Element::new(self.tag.as_str(), self.namespace.clone());

                for (name, value) in &self.parts {
                    let rendered = value.to_xml(registry, Some(name), encoded)?;
                    if let Some(mut element) = rendered {
                        if encoded {
                            type_attribute(registry, value, &mut element)?;
                        }
                        wrapper.children.push(element);
                    }
                }

                Ok(vec![wrapper])
            }
        }
    }
}

/// Adds `xsi:type` naming the value's type, declaring a prefix for it when
/// it is not an XSD type.
fn type_attribute(registry: &Registry, value: &Instance, element: &mut Element) -> Result<(), Error> {
    let name = &registry.descriptor(value.ty())?.name;
    let qualified = match name.namespace.as_deref() {
        Some(ns::XSD) => format!("xsd:{}", name.name),
        Some(namespace) => {
            element.set_attribute("xmlns:ns0", namespace);
            format!("ns0:{}", name.name)
        }
        None => name.name.clone(),
    };

    element.set_attribute("xsi:type", qualified);
    Ok(())
}

/// What a call returned.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// No parts and no headers.
    Empty,
    /// Exactly one part and no headers.
    Value(Instance),
    /// Several parts, or any headers.
    Tuple(Vec<Instance>, BTreeMap<String, Instance>),
}

impl Reply {
    fn from_parts(mut values: Vec<Instance>, headers: BTreeMap<String, Instance>) -> Self {
        match (values.len(), headers.is_empty()) {
            (0, true) => Self::Empty,
            (1, true) => values.pop().map_or(Self::Empty, Self::Value),
            _ => Self::Tuple(values, headers),
        }
    }

    pub fn value(&self) -> Option<&Instance> {
        match self {
            Self::Value(value) => Some(value),
            Self::Tuple(values, _) => values.first(),
            Self::Empty => None,
        }
    }

    pub fn into_value(self) -> Option<Instance> {
        match self {
            Self::Value(value) => Some(value),
            Self::Tuple(values, _) => values.into_iter().next(),
            Self::Empty => None,
        }
    }

    pub fn values(&self) -> &[Instance] {
        match self {
            Self::Value(value) => std::slice::from_ref(value),
            Self::Tuple(values, _) => values,
            Self::Empty => &[],
        }
    }

    pub fn header(&self, name: &str) -> Option<&Instance> {
        match self {
            Self::Tuple(_, headers) => headers.get(name),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

fn find_descendant<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
        .or_else(|| {
            node.descendants()
                .skip(1)
                .find(|child| child.is_element() && child.tag_name().name() == name)
        })
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputMessage {
    pub tag: String,
    pub namespace: Option<String>,
    pub parts: Vec<Part>,
    pub headers: Vec<Part>,
}

impl OutputMessage {
    pub fn new(tag: impl Into<String>, namespace: Option<String>, parts: Vec<Part>, headers: Vec<Part>) -> Self {
        Self {
            tag: tag.into(),
            namespace,
            parts,
            headers,
        }
    }

    /// Reads every part out of the first body child, and every header out of
    /// the SOAP header. Parts with no matching element are left out.
    pub fn parse(&self, registry: &Registry, body: Node, header: Option<Node>) -> Result<Reply, Error> {
        let body_tag = body.tag_name().name();
        let mut values = Vec::new();

        for part in &self.parts {
            let ty = registry.resolve(&part.ty)?;
            let part_tag = registry.descriptor(ty)?.tag.as_deref();

            let node = if body_tag == part.name || Some(body_tag) == part_tag {
                Some(body)
            } else {
                part_tag
                    .and_then(|tag| find_descendant(body, tag))
                    .or_else(|| find_descendant(body, &part.name))
            };

            match node {
                Some(node) => values.extend(Instance::from_xml(registry, ty, node)?),
                None => log::debug!("No element for part {} of {}", part.name, self.tag),
            }
        }

        let mut headers = BTreeMap::new();
        if let Some(header) = header {
            for part in &self.headers {
                let ty = registry.resolve(&part.ty)?;
                if let Some(node) = find_descendant(header, &part.name) {
                    if let Some(value) = Instance::from_xml(registry, ty, node)? {
                        headers.insert(part.name.clone(), value);
                    }
                }
            }
        }

        Ok(Reply::from_parts(values, headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_support, xml};
    use roxmltree::Document;

    fn render(elements: &[Element]) -> String {
        elements
            .iter()
            .map(|element| xml::to_string(element).unwrap())
            .collect()
    }

    #[test]
    fn formatter_selection() {
        let registry = test_support::registry();
        assert_eq!(
            test_support::check_song_exists(&registry, false).input.formatter(),
            Formatter::RpcEncoded
        );
        assert_eq!(
            test_support::check_song_exists(&registry, true).input.formatter(),
            Formatter::RpcLiteral
        );
        assert_eq!(
            test_support::authenticate(&registry).input.formatter(),
            Formatter::DocumentLiteralWrapper
        );

        let two_parts = InputMessage::new(
            &registry,
            "Authenticate",
            None,
            vec![
                test_support::part(&registry, "a", "Authenticate"),
                test_support::part(&registry, "b", "string"),
            ],
            Style::Document,
            true,
            Vec::new(),
        )
        .unwrap();
        assert_eq!(two_parts.formatter(), Formatter::DocumentLiteral);
    }

    #[test]
    fn rpc_literal_wraps_parts_in_declared_order() {
        let registry = test_support::registry();
        let method = test_support::check_song_exists(&registry, true);
        let formatted = method
            .input
            .format(&registry, Args::new().named("song", "1999").arg("prince"))
            .unwrap();

        assert_eq!(
            render(&formatted.body(&registry).unwrap()),
            r#"<checkSongExists xmlns="urn:LyricWiki"><artist xmlns="">prince</artist><song xmlns="">1999</song></checkSongExists>"#
        );
    }

    #[test]
    fn rpc_encoded_adds_type_attributes() {
        let registry = test_support::registry();
        let method = test_support::check_song_exists(&registry, false);
        let formatted = method
            .input
            .format(&registry, Args::new().arg("prince").arg("1999"))
            .unwrap();

        let body = formatted.body(&registry).unwrap();
        assert_eq!(body[0].children[0].attribute("xsi:type"), Some("xsd:string"));
        assert_eq!(body[0].children[1].text.as_deref(), Some("1999"));
    }

    #[test]
    fn missing_parts_are_reported() {
        let registry = test_support::registry();
        let method = test_support::check_song_exists(&registry, true);
        match method.input.format(&registry, Args::new().arg("prince")) {
            Err(Error::MissingArgument { part, .. }) => assert_eq!(part, "song"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wrapper_renders_even_when_empty_and_binds_headers() {
        let registry = test_support::registry();
        let method = test_support::authenticate(&registry);

        let formatted = method
            .input
            .format(&registry, Args::new().named("sessionId", "abc"))
            .unwrap();
        assert_eq!(
            render(&formatted.body(&registry).unwrap()),
            r#"<Authenticate xmlns="urn:LyricWiki"/>"#
        );
        assert_eq!(
            render(&formatted.header(&registry).unwrap()),
            r#"<SessionHeader xmlns="urn:LyricWiki"><sessionId xmlns="">abc</sessionId></SessionHeader>"#
        );

        let formatted = method
            .input
            .format(
                &registry,
                Args::new().named("username", "bono").named("password", "pw"),
            )
            .unwrap();
        assert!(formatted.headers.is_empty());
        let body = formatted.body(&registry).unwrap();
        assert_eq!(body[0].children.len(), 2);
        assert_eq!(body[0].children[0].name, "username");
    }

    #[test]
    fn output_parts_are_matched_by_name() {
        let registry = test_support::registry();
        let method = test_support::check_song_exists(&registry, false);
        let document = Document::parse(
            r#"<checkSongExistsResponse><return>true</return></checkSongExistsResponse>"#,
        )
        .unwrap();

        let reply = method
            .output
            .parse(&registry, document.root_element(), None)
            .unwrap();
        assert_eq!(reply.value().and_then(Instance::as_bool), Some(true));
    }

    #[test]
    fn missing_output_parts_are_omitted() {
        let registry = test_support::registry();
        let method = test_support::check_song_exists(&registry, false);
        let document = Document::parse(r#"<checkSongExistsResponse/>"#).unwrap();

        let reply = method
            .output
            .parse(&registry, document.root_element(), None)
            .unwrap();
        assert_eq!(reply, Reply::Empty);
    }

    #[test]
    fn body_root_can_be_the_part_itself() {
        let registry = test_support::registry();
        let method = test_support::authenticate(&registry);
        let document = Document::parse(
            r#"<AuthenticateResult xmlns="urn:LyricWiki">token</AuthenticateResult>"#,
        )
        .unwrap();

        let reply = method
            .output
            .parse(&registry, document.root_element(), None)
            .unwrap();
        assert_eq!(reply.value().and_then(Instance::as_str), Some("token"));
    }
}
