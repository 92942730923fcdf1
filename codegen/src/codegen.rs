use std::collections::{BTreeSet, HashSet};

use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};

use lather_util::{
    message::{Part, Style},
    soap::Method,
    types::{ComplexType, FieldDescriptor, Kind, MaxOccurs, TypeId, TypeRef},
};

use super::types;

pub trait Codegen {
    fn codegen(&self, definition: &types::Definition) -> TokenStream;
}

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate", "do", "dyn",
    "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in", "let", "loop", "macro",
    "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return", "self", "static", "struct",
    "super", "trait", "true", "try", "type", "typeof", "unsafe", "unsized", "use", "virtual", "where",
    "while", "yield",
];

/// Methods the generated client defines itself.
const RESERVED: &[&str] = &["new", "with_transport", "inner"];

fn type_ident(id: TypeId) -> Ident {
    format_ident!("ty{}", id)
}

fn option_str(value: Option<&str>) -> TokenStream {
    match value {
        Some(value) => quote! { Some(#value) },
        None => quote! { None },
    }
}

fn option_string(value: Option<&str>) -> TokenStream {
    match value {
        Some(value) => quote! { Some(#value.to_owned()) },
        None => quote! { None },
    }
}

pub(crate) fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut snake = String::with_capacity(name.len() + 4);

    for (index, c) in chars.iter().copied().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !snake.is_empty() && !snake.ends_with('_') {
                snake.push('_');
            }
            continue;
        }

        if c.is_ascii_uppercase() && index > 0 {
            let previous = chars[index - 1];
            let next_lower = chars
                .get(index + 1)
                .map_or(false, |next| next.is_ascii_lowercase());

            if previous.is_ascii_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_ascii_uppercase() && next_lower)
            {
                snake.push('_');
            }
        }

        snake.push(c.to_ascii_lowercase());
    }

    let snake = snake.trim_end_matches('_');
    if snake.is_empty() {
        "call".to_owned()
    } else if snake.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", snake)
    } else {
        snake.to_owned()
    }
}

/// A method name for `operation` that is a legal identifier and not yet in `used`.
fn operation_ident(operation: &str, used: &mut HashSet<String>) -> Ident {
    let mut name = snake_case(operation);
    if KEYWORDS.contains(&name.as_str()) || RESERVED.contains(&name.as_str()) {
        name.push('_');
    }

    let mut candidate = name.clone();
    let mut counter = 1;
    while !used.insert(candidate.clone()) {
        counter += 1;
        candidate = format!("{}_{}", name, counter);
    }

    format_ident!("{}", candidate)
}

/// References from one declaration: builtins are looked up, earlier
/// declarations are used directly and deferred ones go by name.
struct References<'a> {
    definition: &'a types::Definition,
    deferred: &'a BTreeSet<TypeId>,
}

impl References<'_> {
    fn id(&self, id: TypeId) -> TokenStream {
        if self.definition.builtins.contains(&id) {
            let name = self.definition.name(id);
            quote! { registry.require(#name)? }
        } else {
            let ident = type_ident(id);
            quote! { #ident }
        }
    }

    fn type_ref(&self, ty: &TypeRef) -> TokenStream {
        match ty {
            TypeRef::Resolved(id) if !self.deferred.contains(id) => {
                let id = self.id(*id);
                quote! { TypeRef::Resolved(#id) }
            }
            TypeRef::Resolved(id) => {
                let name = self.definition.name(*id);
                quote! { TypeRef::deferred(#name) }
            }
            TypeRef::Deferred(name) => quote! { TypeRef::deferred(#name) },
        }
    }

    fn field(&self, field: &FieldDescriptor) -> TokenStream {
        let name = &field.name;
        let namespace = option_string(field.namespace.as_deref());
        let ty = self.type_ref(&field.ty);
        let required = field.required;

        let min = match field.min {
            Some(min) => quote! { Some(#min) },
            None => quote! { None },
        };

        let max = match field.max {
            Some(MaxOccurs::Bounded(max)) => quote! { Some(MaxOccurs::Bounded(#max)) },
            Some(MaxOccurs::Unbounded) => quote! { Some(MaxOccurs::Unbounded) },
            None => quote! { None },
        };

        quote! {
            FieldDescriptor {
                name: #name.to_owned(),
                namespace: #namespace,
                ty: #ty,
                required: #required,
                min: #min,
                max: #max,
            }
        }
    }

    fn complex(&self, complex: &ComplexType) -> TokenStream {
        let attributes: Vec<_> = complex.attributes.iter().map(|field| self.field(field)).collect();
        let children: Vec<_> = complex.children.iter().map(|field| self.field(field)).collect();

        let content_type = match &complex.content_type {
            Some(ty) => {
                let ty = self.type_ref(ty);
                quote! { Some(#ty) }
            }
            None => quote! { None },
        };

        let substitutions: Vec<_> = complex
            .substitutions
            .iter()
            .map(|(element, ty)| {
                let ty = self.type_ref(ty);
                quote! { (#element.to_owned(), #ty) }
            })
            .collect();

        let is_abstract = complex.is_abstract;
        let type_attr = option_string(complex.type_attr.as_deref());
        let any_attribute = complex.any_attribute;

        quote! {
            ComplexType {
                attributes: vec![#(#attributes),*],
                children: vec![#(#children),*],
                content_type: #content_type,
                substitutions: vec![#(#substitutions),*],
                is_abstract: #is_abstract,
                type_attr: #type_attr,
                any_attribute: #any_attribute,
            }
        }
    }

    fn kind(&self, kind: &Kind) -> TokenStream {
        match kind {
            Kind::Simple(builtin) => {
                let variant = format_ident!("{}", builtin.variant());
                quote! { Kind::Simple(Builtin::#variant) }
            }
            Kind::Complex(complex) => {
                let complex = self.complex(complex);
                quote! { Kind::Complex(#complex) }
            }
            Kind::Enum(values) => quote! { Kind::Enum(vec![#(#values.to_owned()),*]) },
            Kind::Array(item) => {
                let item = self.type_ref(item);
                quote! { Kind::Array(#item) }
            }
            Kind::List(item) => {
                let item = self.type_ref(item);
                quote! { Kind::List(#item) }
            }
            Kind::Union => quote! { Kind::Union },
            Kind::Any => quote! { Kind::Any },
        }
    }
}

impl Codegen for types::Declaration {
    fn codegen(&self, definition: &types::Definition) -> TokenStream {
        let references = References {
            definition,
            deferred: &self.deferred,
        };

        let ident = type_ident(self.id);
        let descriptor = &self.descriptor;

        let namespace = option_str(descriptor.name.namespace.as_deref());
        let name = &descriptor.name.name;
        let tag = option_string(descriptor.tag.as_deref());
        let element_namespace = option_string(descriptor.namespace.as_deref());

        let base = match descriptor.base {
            Some(base) => {
                let base = references.id(base);
                quote! { Some(#base) }
            }
            None => quote! { None },
        };

        let kind = references.kind(&descriptor.kind);

        quote! {
            let descriptor = TypeDescriptor {
                name: QName::new(#namespace, #name),
                tag: #tag,
                namespace: #element_namespace,
                base: #base,
                kind: #kind,
            };
            let #ident = registry.define(descriptor);
        }
    }
}

fn codegen_parts(definition: &types::Definition, parts: &[Part]) -> Vec<TokenStream> {
    parts
        .iter()
        .map(|part| {
            let name = &part.name;
            let ty = match &part.ty {
                TypeRef::Resolved(id) => definition.name(*id),
                TypeRef::Deferred(name) => name.as_str(),
            };

            quote! { Part::new(#name, TypeRef::Resolved(registry.require(#ty)?)) }
        })
        .collect()
}

impl Codegen for Method {
    fn codegen(&self, definition: &types::Definition) -> TokenStream {
        let location = &self.location;
        let name = &self.name;
        let action = &self.action;

        let input_tag = &self.input.tag;
        let input_namespace = option_string(self.input.namespace.as_deref());
        let input_parts = codegen_parts(definition, &self.input.parts);
        let input_headers = codegen_parts(definition, &self.input.headers);
        let literal = self.input.literal;
        let style = match self.input.style {
            Style::Document => quote! { Style::Document },
            Style::Rpc => quote! { Style::Rpc },
        };

        let output_tag = &self.output.tag;
        let output_namespace = option_string(self.output.namespace.as_deref());
        let output_parts = codegen_parts(definition, &self.output.parts);
        let output_headers = codegen_parts(definition, &self.output.headers);

        quote! {
            Method {
                location: #location.to_owned(),
                name: #name.to_owned(),
                action: #action.to_owned(),
                input: InputMessage::new(
                    registry,
                    #input_tag,
                    #input_namespace,
                    vec![#(#input_parts),*],
                    #style,
                    #literal,
                    vec![#(#input_headers),*],
                )?,
                output: OutputMessage::new(
                    #output_tag,
                    #output_namespace,
                    vec![#(#output_parts),*],
                    vec![#(#output_headers),*],
                ),
            }
        }
    }
}

fn codegen_operations(methods: &[Method]) -> Vec<TokenStream> {
    let mut used = HashSet::new();

    methods
        .iter()
        .map(|method| {
            let ident = operation_ident(&method.name, &mut used);
            let name = &method.name;
            let doc = format!("Calls `{}` at {}.", method.name, method.location);

            quote! {
                #[doc = #doc]
                pub fn #ident(&self, args: ::lather_util::Args) -> Result<::lather_util::Reply, ::lather_util::Error> {
                    self.inner.call(#name, args)
                }
            }
        })
        .collect()
}

pub fn codegen(definition: &types::Definition) -> TokenStream {
    let declarations: Vec<_> = definition
        .declarations
        .iter()
        .map(|declaration| declaration.codegen(definition))
        .collect();
    let methods: Vec<_> = definition
        .methods
        .iter()
        .map(|method| method.codegen(definition))
        .collect();
    let operations = codegen_operations(&definition.methods);
    let target_namespace = option_str(definition.target_namespace.as_deref());

    quote! {
        pub mod types {
            #![allow(unused_imports, unused_variables)]

            use ::lather_util::types::{
                Builtin, ComplexType, FieldDescriptor, Kind, MaxOccurs, QName, Registry, TypeDescriptor, TypeRef,
            };

            /// Every type of the service, rebuilt without reading its description.
            pub fn registry() -> Result<Registry, ::lather_util::Error> {
                let mut registry = Registry::new();
                #(#declarations)*
                registry.resolve_refs()?;
                Ok(registry)
            }
        }

        pub mod methods {
            #![allow(unused_imports)]

            use ::lather_util::{
                message::{InputMessage, OutputMessage, Part, Style},
                soap::Method,
                types::{Registry, TypeRef},
            };

            pub fn all(registry: &Registry) -> Result<Vec<Method>, ::lather_util::Error> {
                Ok(vec![#(#methods),*])
            }
        }

        pub const TARGET_NAMESPACE: Option<&str> = #target_namespace;

        pub struct Client<T = ::lather_util::transport::HttpTransport> {
            inner: ::lather_util::Client<T>,
        }

        impl Client<::lather_util::transport::HttpTransport> {
            pub fn new() -> Result<Self, ::lather_util::Error> {
                Self::with_transport(::lather_util::transport::HttpTransport::new())
            }
        }

        impl<T: ::lather_util::transport::Transport> Client<T> {
            pub fn with_transport(transport: T) -> Result<Self, ::lather_util::Error> {
                let registry = types::registry()?;
                let methods = methods::all(&registry)?;
                Ok(Self {
                    inner: ::lather_util::Client::new(registry, methods, transport),
                })
            }

            pub fn inner(&self) -> &::lather_util::Client<T> {
                &self.inner
            }

            #(#operations)*
        }
    }
}
