use std::{collections::HashMap, sync::Arc};

use roxmltree::{Document, Node, NodeId};

use lather_util::{
    message::{InputMessage, OutputMessage, Part, Style},
    ns,
    soap::Method,
    types::{Builtin, ComplexType, FieldDescriptor, Kind, MaxOccurs, QName, Registry, TypeDescriptor, TypeId, TypeRef, ANY_TYPE},
};

use crate::{
    error::Error,
    loader::Source,
    schema::{Schema, SchemaStack},
    types::Definition,
};

fn is_xsd(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(ns::XSD) && node.tag_name().name() == name
}

fn is_wsdl(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(ns::WSDL) && node.tag_name().name() == name
}

fn is_soap(node: &Node, name: &str) -> bool {
    node.is_element()
        && matches!(node.tag_name().namespace(), Some(ns::WSDL_SOAP) | Some(ns::WSDL_SOAP12))
        && node.tag_name().name() == name
}

fn is_type(node: &Node) -> bool {
    is_xsd(node, "complexType") || is_xsd(node, "simpleType")
}

/// Element children, skipping annotations.
fn content<'a, 'input: 'a>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|child| child.is_element() && !is_xsd(child, "annotation"))
}

fn first_content<'a, 'input: 'a>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    content(node).next()
}

/// The first `restriction` found walking down first children.
fn find_restriction<'a, 'input: 'a>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    match node.children().find(|child| is_xsd(child, "restriction")) {
        Some(restriction) => Some(restriction),
        None => first_content(node).and_then(find_restriction),
    }
}

fn enumerations(node: Node) -> Vec<String> {
    find_restriction(node)
        .map(|restriction| {
            restriction
                .children()
                .filter(|child| is_xsd(child, "enumeration"))
                .filter_map(|child| child.attribute("value"))
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Element declarations under a particle, with the maxOccurs each one ends
/// up with. A choice's maxOccurs overrides those of everything inside it.
fn particles<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    max: Option<&'a str>,
    out: &mut Vec<(Node<'a, 'input>, Option<&'a str>)>,
) {
    let max = if is_xsd(&node, "choice") {
        node.attribute("maxOccurs").or(max)
    } else {
        max
    };

    for child in content(node) {
        match child.tag_name().name() {
            "element" => out.push((child, max.or_else(|| child.attribute("maxOccurs")))),
            "sequence" | "choice" | "all" => particles(child, max, out),
            other => log::trace!("Skipping {} particle", other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Classification {
    Enum,
    Array,
    List,
    Union,
    Simple,
    Complex,
}

impl Classification {
    /// First match wins: enum, array, list, union, simple, complex.
    fn of(node: Node) -> Self {
        let simple = is_xsd(&node, "simpleType");

        if simple && !enumerations(node).is_empty() {
            return Self::Enum;
        }

        let array = first_content(node)
            .and_then(first_content)
            .filter(|restriction| is_xsd(restriction, "restriction"))
            .and_then(|restriction| restriction.attribute("base"))
            .map_or(false, |base| ns::local(base) == "Array");
        if array {
            return Self::Array;
        }

        match first_content(node) {
            Some(first) if simple && is_xsd(&first, "list") => Self::List,
            Some(first) if simple && is_xsd(&first, "union") => Self::Union,
            _ if simple => Self::Simple,
            _ => Self::Complex,
        }
    }
}

/// A bound SOAP operation, kept by name until the registry is resolved.
struct Operation<'a> {
    location: &'a str,
    name: &'a str,
    action: &'a str,
    style: Style,
    literal: bool,
    input: Vec<Part>,
    input_headers: Vec<Part>,
    output: Vec<Part>,
    output_headers: Vec<Part>,
}

struct Parser<'a, 'input> {
    types: HashMap<&'a str, Node<'a, 'input>>,
    elements: HashMap<&'a str, Node<'a, 'input>>,
    messages: HashMap<&'a str, Node<'a, 'input>>,
    bindings: HashMap<&'a str, Node<'a, 'input>>,
    port_types: HashMap<&'a str, Node<'a, 'input>>,

    element_types: HashMap<&'a str, TypeRef>,
    classifications: HashMap<(usize, NodeId), Classification>,
    lends: Vec<(String, Option<String>)>,

    schemas: SchemaStack,
    registry: Registry,
}

impl<'a, 'input: 'a> Parser<'a, 'input> {
    fn new(documents: &'a [Document<'input>]) -> Self {
        let mut parser = Self {
            types: HashMap::new(),
            elements: HashMap::new(),
            messages: HashMap::new(),
            bindings: HashMap::new(),
            port_types: HashMap::new(),
            element_types: HashMap::new(),
            classifications: HashMap::new(),
            lends: Vec::new(),
            schemas: SchemaStack::default(),
            registry: Registry::new(),
        };

        for document in documents {
            for node in document.descendants().filter(Node::is_element) {
                let name = match node.attribute("name") {
                    Some(name) => name,
                    None => continue,
                };

                let global = node
                    .parent_element()
                    .map_or(false, |parent| is_xsd(&parent, "schema"));
                let definition = node
                    .parent_element()
                    .map_or(false, |parent| is_wsdl(&parent, "definitions"));

                let index = if global && is_type(&node) {
                    &mut parser.types
                } else if global && is_xsd(&node, "element") {
                    &mut parser.elements
                } else if definition && is_wsdl(&node, "message") {
                    &mut parser.messages
                } else if definition && is_wsdl(&node, "binding") {
                    &mut parser.bindings
                } else if definition && is_wsdl(&node, "portType") {
                    &mut parser.port_types
                } else {
                    continue;
                };

                index.entry(name).or_insert(node);
            }
        }

        parser
    }

    /// Pushes the schema scope `node` is declared in.
    fn enter(&mut self, node: Node<'a, 'input>) {
        let scope = node
            .ancestors()
            .find(|ancestor| is_xsd(ancestor, "schema") || is_wsdl(ancestor, "definitions"));
        self.schemas.push(scope.map(Schema::from_node).unwrap_or_default());
    }

    fn classify(&mut self, node: Node<'a, 'input>) -> Classification {
        let key = (node.document() as *const Document as usize, node.id());
        if let Some(classification) = self.classifications.get(&key) {
            return *classification;
        }

        let classification = Classification::of(node);
        log::trace!(
            "{} is {:?}",
            node.attribute("name").unwrap_or("anonymous type"),
            classification
        );
        self.classifications.insert(key, classification);
        classification
    }

    fn process_types(&mut self, documents: &'a [Document<'input>]) -> Result<(), Error> {
        for document in documents {
            let root = document.root_element();

            if is_xsd(&root, "schema") {
                self.process_schema(root)?;
                continue;
            }

            for types in root.children().filter(|child| is_wsdl(child, "types")) {
                for child in types.children().filter(Node::is_element) {
                    if is_xsd(&child, "schema") {
                        self.process_schema(child)?;
                    } else {
                        return Err(Error::UnknownConstruct(format!(
                            "{} inside types",
                            child.tag_name().name()
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn process_schema(&mut self, schema: Node<'a, 'input>) -> Result<(), Error> {
        self.schemas.push(Schema::from_node(schema));

        for child in content(schema) {
            let name = match child.attribute("name") {
                Some(name) => name,
                None => continue,
            };

            if is_xsd(&child, "element") {
                self.element_by_name(name)?;
            } else if is_type(&child) {
                self.make_named(child, name, false)?;
            }
        }

        self.schemas.pop();
        Ok(())
    }

    /// The type named by a `type=`/`base=` reference.
    fn type_by_name(&mut self, qname: &'a str) -> Result<TypeRef, Error> {
        let (namespace, key) = self.schemas.resolve(qname);
        let builtin = namespace == Some(ns::XSD);

        if self.registry.contains(key) {
            return Ok(self.registry.lookup(key));
        }

        if builtin {
            log::warn!("Unsupported builtin {}, reading it as a string", qname);
            return Ok(self.registry.lookup("string"));
        }

        if let Some(node) = self.types.get(key).copied() {
            return self.make_named(node, key, false);
        }

        if self.elements.contains_key(key) {
            return self.element_by_name(qname);
        }

        Err(Error::UnknownType(qname.to_owned()))
    }

    /// The type of the global element named by an `element=`/`ref=` reference.
    fn element_by_name(&mut self, qname: &'a str) -> Result<TypeRef, Error> {
        let key = ns::local(qname);
        if let Some(ty) = self.element_types.get(key) {
            return Ok(ty.clone());
        }

        match self.elements.get(key).copied() {
            Some(element) => {
                self.enter(element);
                let result = self.make_element(element, key);
                self.schemas.pop();
                result
            }
            None => self.type_by_name(qname),
        }
    }

    fn make_element(&mut self, element: Node<'a, 'input>, name: &'a str) -> Result<TypeRef, Error> {
        let namespace = self.schemas.target_namespace().map(ToOwned::to_owned);

        let ty = match element.attribute("type") {
            Some(type_name) => self.type_by_name(type_name)?,
            None => match first_content(element).filter(is_type) {
                Some(inline) => self.make_named(inline, name, true)?,
                None => self.registry.lookup("string"),
            },
        };

        let ty = self.wrap(name, namespace, ty)?;
        self.element_types.insert(name, ty.clone());

        if let Some(head) = element.attribute("substitutionGroup") {
            self.substitute(head, name, ty.clone())?;
        }

        Ok(ty)
    }

    /// Gives the element's name to its type: lent as the tag when the type
    /// carries the same name, otherwise through a renamed subclass.
    fn wrap(&mut self, name: &str, namespace: Option<String>, ty: TypeRef) -> Result<TypeRef, Error> {
        let id = match &ty {
            TypeRef::Resolved(id) => *id,
            TypeRef::Deferred(pending) => {
                if pending == name {
                    self.lends.push((name.to_owned(), namespace));
                } else {
                    log::trace!("Element {} refers to {} while it is being built", name, pending);
                }
                return Ok(ty);
            }
        };

        if self.registry.descriptor(id)?.name.name == name {
            self.lends.push((name.to_owned(), namespace));
            return Ok(ty);
        }

        if self.registry.contains(name) {
            log::trace!("Element {} shares its name with another type, using {:?}", name, ty);
            return Ok(ty);
        }

        Ok(TypeRef::Resolved(self.make_subclass(name, namespace, id)?))
    }

    fn make_subclass(&mut self, name: &str, namespace: Option<String>, base: TypeId) -> Result<TypeId, Error> {
        let kind = self.registry.descriptor(base)?.kind.clone();
        log::trace!("Element {} wraps {}", name, base);

        Ok(self.registry.define(TypeDescriptor {
            name: QName::new(namespace.as_deref(), name),
            tag: Some(name.to_owned()),
            namespace,
            base: Some(base),
            kind,
        }))
    }

    /// Registers `element` as a substitute in the group headed by `head`.
    fn substitute(&mut self, head: &'a str, element: &str, ty: TypeRef) -> Result<(), Error> {
        let head_name = match self.element_by_name(head)? {
            TypeRef::Resolved(id) => self.registry.descriptor(id)?.name.name.clone(),
            TypeRef::Deferred(name) => name,
        };

        self.registry.add_substitution(&head_name, element, ty);
        Ok(())
    }

    /// Builds a type from its declaration unless `name` is already known.
    /// `force_name` tags instances with `name`, for types declared inline in
    /// a global element.
    fn make_named(&mut self, node: Node<'a, 'input>, name: &str, force_name: bool) -> Result<TypeRef, Error> {
        if self.registry.contains(name) {
            return Ok(self.registry.lookup(name));
        }

        self.enter(node);
        let result = self.make_class(node, name, force_name);
        self.schemas.pop();
        result
    }

    fn make_class(&mut self, node: Node<'a, 'input>, name: &str, force_name: bool) -> Result<TypeRef, Error> {
        let namespace = self.schemas.target_namespace().map(ToOwned::to_owned);
        let forced = force_name.then(|| name.to_owned());

        let kind = match self.classify(node) {
            Classification::Complex => return self.make_complex(node, name, namespace, forced),
            Classification::Enum => Kind::Enum(enumerations(node)),
            Classification::Array => Kind::Array(self.array_item(node)?),
            Classification::List => Kind::List(self.list_item(node, name)?),
            Classification::Union => Kind::Union,
            Classification::Simple => self.simple_kind(node)?,
        };

        // Simple and union values render under their type name.
        let (tag, element_namespace) = match kind {
            Kind::Simple(_) | Kind::Union => (Some(name.to_owned()), namespace.clone()),
            _ => (forced, None),
        };

        let id = self.registry.define(TypeDescriptor {
            name: QName::new(namespace.as_deref(), name),
            tag,
            namespace: element_namespace,
            base: None,
            kind,
        });

        Ok(TypeRef::Resolved(id))
    }

    fn simple_kind(&mut self, node: Node<'a, 'input>) -> Result<Kind, Error> {
        let base = match find_restriction(node).and_then(|restriction| restriction.attribute("base")) {
            Some(base) => self.type_by_name(base)?,
            None => return Ok(Kind::Simple(Builtin::String)),
        };

        let kind = base
            .id()
            .and_then(|id| self.registry.get(id))
            .map(|descriptor| &descriptor.kind);

        Ok(match kind {
            Some(Kind::Simple(builtin)) => Kind::Simple(*builtin),
            Some(Kind::Enum(values)) => Kind::Enum(values.clone()),
            _ => Kind::Simple(Builtin::String),
        })
    }

    /// Item type of a SOAP-encoded array, from `wsdl:arrayType` or a sequence.
    fn array_item(&mut self, node: Node<'a, 'input>) -> Result<TypeRef, Error> {
        let content = first_content(node)
            .and_then(first_content)
            .and_then(first_content);

        let item = match content {
            Some(content) if is_xsd(&content, "attribute") => content
                .attribute((ns::WSDL, "arrayType"))
                .map(|array_type| array_type.split_once('[').map_or(array_type, |(item, _)| item)),
            Some(content) if is_xsd(&content, "sequence") => {
                first_content(content).and_then(|element| element.attribute("type"))
            }
            _ => None,
        };

        match item {
            Some(item) => self.type_by_name(item),
            None => Ok(self.registry.lookup(ANY_TYPE)),
        }
    }

    fn list_item(&mut self, node: Node<'a, 'input>, name: &str) -> Result<TypeRef, Error> {
        let list = match first_content(node) {
            Some(list) => list,
            None => return Ok(self.registry.lookup("string")),
        };

        if let Some(item) = list.attribute("itemType") {
            return self.type_by_name(item);
        }

        match first_content(list).filter(is_type) {
            Some(inline) => self.make_named(inline, &format!("{}.item", name), false),
            None => Ok(self.registry.lookup("string")),
        }
    }

    fn make_complex(
        &mut self,
        node: Node<'a, 'input>,
        name: &str,
        namespace: Option<String>,
        tag: Option<String>,
    ) -> Result<TypeRef, Error> {
        // Children may refer back to this type.
        self.registry.reserve(name);

        let child_namespace = self.schemas.top().and_then(Schema::element_namespace);
        let mut complex = ComplexType::default();
        let mut base = None;

        for child in content(node) {
            match child.tag_name().name() {
                "complexContent" | "simpleContent" => {
                    let derivation = match first_content(child) {
                        Some(derivation) => derivation,
                        None => continue,
                    };

                    if is_xsd(&derivation, "extension") {
                        if is_xsd(&child, "complexContent") {
                            base = Some(self.base_type(name, derivation)?);
                        } else if let Some(content_type) = derivation.attribute("base") {
                            complex.content_type = Some(self.type_by_name(content_type)?);
                        }
                    }

                    for field in content(derivation) {
                        self.add_field(&mut complex, field, name, &child_namespace)?;
                    }
                }
                _ => self.add_field(&mut complex, child, name, &child_namespace)?,
            }
        }

        if let Some(base) = base {
            if let Some(inherited) = self.registry.descriptor(base)?.complex() {
                let mut attributes = inherited.attributes.clone();
                attributes.append(&mut complex.attributes);
                complex.attributes = attributes;

                let mut children = inherited.children.clone();
                children.append(&mut complex.children);
                complex.children = children;

                if complex.content_type.is_none() {
                    complex.content_type = inherited.content_type.clone();
                }
                complex.any_attribute |= inherited.any_attribute;
            }
        }

        complex.is_abstract = node.attribute("abstract") == Some("true");
        if !complex.is_abstract && base.map_or(false, |base| self.registry.any_abstract(base)) {
            complex.type_attr = Some(name.to_owned());
        }

        let id = self.registry.define(TypeDescriptor {
            name: QName::new(namespace.as_deref(), name),
            tag,
            namespace,
            base,
            kind: Kind::Complex(complex),
        });

        if let Some(head) = node.attribute("substitutionGroup") {
            self.substitute(head, name, TypeRef::Resolved(id))?;
        }

        Ok(TypeRef::Resolved(id))
    }

    fn base_type(&mut self, name: &str, extension: Node<'a, 'input>) -> Result<TypeId, Error> {
        let base = extension
            .attribute("base")
            .ok_or_else(|| Error::UnknownConstruct(format!("extension without a base in {}", name)))?;

        match self.type_by_name(base)? {
            TypeRef::Resolved(id) => Ok(id),
            TypeRef::Deferred(base) => Err(lather_util::Error::BaseNotResolved {
                name: name.to_owned(),
                base,
            }
            .into()),
        }
    }

    fn add_field(
        &mut self,
        complex: &mut ComplexType,
        node: Node<'a, 'input>,
        owner: &str,
        namespace: &Option<String>,
    ) -> Result<(), Error> {
        match node.tag_name().name() {
            "attribute" => self.add_attribute(complex, node, owner, namespace),
            "sequence" | "all" | "choice" => self.add_children(complex, node, owner, namespace),
            "anyAttribute" => {
                complex.any_attribute = true;
                Ok(())
            }
            other => {
                log::trace!("Skipping {} in {}", other, owner);
                Ok(())
            }
        }
    }

    fn add_attribute(
        &mut self,
        complex: &mut ComplexType,
        node: Node<'a, 'input>,
        owner: &str,
        namespace: &Option<String>,
    ) -> Result<(), Error> {
        let name = match node.attribute("name") {
            Some(name) => name,
            None => {
                log::trace!("Skipping attribute reference in {}", owner);
                return Ok(());
            }
        };

        let ty = match node.attribute("type") {
            Some(type_name) => self.type_by_name(type_name)?,
            None => match first_content(node).filter(is_type) {
                Some(inline) => self.make_named(inline, &format!("{}.{}", owner, name), false)?,
                None => self.registry.lookup("string"),
            },
        };

        let mut field = FieldDescriptor::new(name, ty).with_namespace(namespace.clone());
        field.required = node.attribute("use") == Some("required");
        complex.attributes.push(field);
        Ok(())
    }

    fn add_children(
        &mut self,
        complex: &mut ComplexType,
        particle: Node<'a, 'input>,
        owner: &str,
        namespace: &Option<String>,
    ) -> Result<(), Error> {
        let mut elements = Vec::new();
        particles(particle, None, &mut elements);

        for (element, max) in elements {
            let (name, ty) = match element.attribute("ref") {
                Some(reference) => (
                    element.attribute("name").unwrap_or_else(|| ns::local(reference)),
                    self.element_by_name(reference)?,
                ),
                None => {
                    let name = match element.attribute("name") {
                        Some(name) => name,
                        None => continue,
                    };

                    let ty = match element.attribute("type") {
                        Some(type_name) => self.type_by_name(type_name)?,
                        None => match first_content(element).filter(is_type) {
                            Some(inline) => self.make_named(inline, &format!("{}.{}", owner, name), false)?,
                            None => self.registry.lookup("string"),
                        },
                    };

                    (name, ty)
                }
            };

            let mut field = FieldDescriptor::new(name, ty).with_namespace(namespace.clone());
            field.min = element.attribute("minOccurs").and_then(|min| min.trim().parse().ok());
            field.max = max.and_then(MaxOccurs::parse);
            complex.children.push(field);
        }

        Ok(())
    }

    fn process_methods(&mut self, documents: &'a [Document<'input>]) -> Result<Vec<Operation<'a>>, Error> {
        let mut operations = Vec::new();

        for document in documents {
            let root = document.root_element();
            if !is_wsdl(&root, "definitions") {
                continue;
            }

            let ports = root
                .children()
                .filter(|child| is_wsdl(child, "service"))
                .flat_map(|service| service.children().filter(|child| is_wsdl(child, "port")));

            for port in ports {
                let location = port
                    .children()
                    .find(|child| is_soap(child, "address"))
                    .and_then(|address| address.attribute("location"));

                match location {
                    Some(location) => self.process_port(port, location, &mut operations)?,
                    None => log::trace!("Skipping port {:?}, it is not a SOAP port", port.attribute("name")),
                }
            }
        }

        Ok(operations)
    }

    fn definition(
        index: &HashMap<&'a str, Node<'a, 'input>>,
        kind: &'static str,
        qname: Option<&'a str>,
    ) -> Result<Node<'a, 'input>, Error> {
        let name = qname.map(ns::local).unwrap_or_default();
        index.get(name).copied().ok_or_else(|| Error::MissingDefinition {
            kind,
            name: name.to_owned(),
        })
    }

    /// Adds the operations bound by `port`. An operation already bound by an
    /// earlier port keeps that binding, so with several SOAP ports the first
    /// one in document order wins rather than the last.
    fn process_port(
        &mut self,
        port: Node<'a, 'input>,
        location: &'a str,
        operations: &mut Vec<Operation<'a>>,
    ) -> Result<(), Error> {
        let binding = Self::definition(&self.bindings, "binding", port.attribute("binding"))?;
        let binding_name = binding.attribute("name").unwrap_or_default();

        let soap_binding = binding
            .children()
            .find(|child| is_soap(child, "binding"))
            .ok_or_else(|| Error::NoSoapBinding(binding_name.to_owned()))?;
        let binding_style = soap_binding.attribute("style");

        let port_type = Self::definition(&self.port_types, "portType", binding.attribute("type"))?;

        for op in binding.children().filter(|child| is_wsdl(child, "operation")) {
            let name = match op.attribute("name") {
                Some(name) => name,
                None => continue,
            };

            if operations.iter().any(|operation| operation.name == name) {
                log::trace!("{} is already bound by an earlier port", name);
                continue;
            }

            let soap_op = match op.children().find(|child| is_soap(child, "operation")) {
                Some(soap_op) => soap_op,
                None => {
                    log::trace!("Skipping {} in {}, it has no SOAP operation", name, binding_name);
                    continue;
                }
            };

            let style = soap_op
                .attribute("style")
                .or(binding_style)
                .unwrap_or("document")
                .parse::<Style>()
                .map_err(|style| Error::UnknownConstruct(format!("binding style {}", style)))?;

            let input = op.children().find(|child| is_wsdl(child, "input"));
            let output = op.children().find(|child| is_wsdl(child, "output"));

            let literal = input
                .and_then(|input| input.children().find(|child| is_soap(child, "body")))
                .and_then(|body| body.attribute("use"))
                == Some("literal");

            let port_op = port_type
                .children()
                .find(|child| is_wsdl(child, "operation") && child.attribute("name") == Some(name))
                .ok_or_else(|| Error::MissingDefinition {
                    kind: "operation",
                    name: name.to_owned(),
                })?;

            operations.push(Operation {
                location,
                name,
                action: soap_op.attribute("soapAction").unwrap_or_default(),
                style,
                literal,
                input: self.message_parts(port_op, "input")?,
                input_headers: self.header_parts(input)?,
                output: self.message_parts(port_op, "output")?,
                output_headers: self.header_parts(output)?,
            });
        }

        Ok(())
    }

    fn message_parts(&mut self, port_op: Node<'a, 'input>, direction: &str) -> Result<Vec<Part>, Error> {
        let message = port_op
            .children()
            .find(|child| is_wsdl(child, direction))
            .and_then(|child| child.attribute("message"));

        let message = match message {
            Some(message) => Self::definition(&self.messages, "message", Some(message))?,
            None => return Ok(Vec::new()),
        };

        let mut parts = Vec::new();
        for part in message.children().filter(|child| is_wsdl(child, "part")) {
            if let (Some(name), Some(ty)) = (part.attribute("name"), self.part_type(part)?) {
                parts.push(Part::new(name, ty));
            }
        }

        Ok(parts)
    }

    /// `soap:header` declarations name a message and one of its parts.
    fn header_parts(&mut self, io: Option<Node<'a, 'input>>) -> Result<Vec<Part>, Error> {
        let headers = io
            .into_iter()
            .flat_map(|io| io.children().filter(|child| is_soap(child, "header")));

        let mut parts = Vec::new();
        for header in headers {
            let message = Self::definition(&self.messages, "message", header.attribute("message"))?;
            let name = header.attribute("part").unwrap_or_default();

            let part = message
                .children()
                .find(|child| is_wsdl(child, "part") && child.attribute("name") == Some(name))
                .ok_or_else(|| Error::MissingDefinition {
                    kind: "part",
                    name: name.to_owned(),
                })?;

            if let Some(ty) = self.part_type(part)? {
                parts.push(Part::new(name, ty));
            }
        }

        Ok(parts)
    }

    fn part_type(&mut self, part: Node<'a, 'input>) -> Result<Option<TypeRef>, Error> {
        self.enter(part);
        let result = match (part.attribute("element"), part.attribute("type")) {
            (Some(element), _) => self.element_by_name(element).map(Some),
            (None, Some(ty)) => self.type_by_name(ty).map(Some),
            (None, None) => Ok(None),
        };
        self.schemas.pop();
        result
    }

    /// Patches every deferred reference, then builds the methods against the
    /// finished registry.
    fn finish(mut self, root: Node<'a, 'input>, operations: Vec<Operation<'a>>) -> Result<Definition, Error> {
        for (name, namespace) in std::mem::take(&mut self.lends) {
            self.registry.lend_tag(&name, &name, namespace);
        }

        self.registry.resolve_refs()?;
        let registry = self.registry;
        let resolve = |parts| resolved(&registry, parts);

        let namespace = root.attribute("targetNamespace").map(ToOwned::to_owned);
        let mut methods = Vec::with_capacity(operations.len());

        for operation in operations {
            let input = InputMessage::new(
                &registry,
                operation.name,
                namespace.clone(),
                resolve(operation.input)?,
                operation.style,
                operation.literal,
                resolve(operation.input_headers)?,
            )?;

            let output = OutputMessage::new(
                operation.name,
                namespace.clone(),
                resolve(operation.output)?,
                resolve(operation.output_headers)?,
            );

            methods.push(Method {
                location: operation.location.to_owned(),
                name: operation.name.to_owned(),
                action: operation.action.to_owned(),
                input,
                output,
            });
        }

        log::debug!("Built {} types and {} methods", registry.len(), methods.len());

        Ok(Definition {
            target_namespace: namespace,
            registry: Arc::new(registry),
            methods,
        })
    }
}

fn resolved(registry: &Registry, parts: Vec<Part>) -> Result<Vec<Part>, Error> {
    let mut resolved = Vec::with_capacity(parts.len());
    for part in parts {
        let id = registry.resolve(&part.ty)?;
        resolved.push(Part::new(part.name, TypeRef::Resolved(id)));
    }

    Ok(resolved)
}

/// Builds the registry and methods described by `sources`, the root document first.
pub(crate) fn parse(sources: &[Source]) -> Result<Definition, Error> {
    let documents = sources
        .iter()
        .map(|source| Document::parse(&source.text))
        .collect::<Result<Vec<_>, _>>()?;

    let root = documents
        .first()
        .map(Document::root_element)
        .ok_or_else(|| Error::MissingDocument("root".to_owned()))?;

    let mut parser = Parser::new(&documents);
    parser.schemas.push(Schema::from_node(root));

    parser.process_types(&documents)?;
    let operations = parser.process_methods(&documents)?;
    parser.finish(root, operations)
}
