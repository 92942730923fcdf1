use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

use crate::{error::Error, ns};

/// Index of a type inside a [`Registry`].
pub type TypeId = usize;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub namespace: Option<String>,
    pub name: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(ToOwned::to_owned),
            name: name.to_owned(),
        }
    }

    /// Parses the `{namespace}name` form produced by [`QName::qualified`].
    pub fn parse(qualified: &str) -> Self {
        match qualified.strip_prefix('{').and_then(|rest| rest.split_once('}')) {
            Some((namespace, name)) => Self::new(Some(namespace), name),
            None => Self::new(None, qualified),
        }
    }

    pub fn qualified(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{{{}}}{}", namespace, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// A reference to another type that may not be defined yet.
///
/// Every `Deferred` reference is replaced by `Resolved` in
/// [`Registry::resolve_refs`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Resolved(TypeId),
    Deferred(String),
}

impl TypeRef {
    pub fn deferred(name: impl Into<String>) -> Self {
        Self::Deferred(name.into())
    }

    pub fn id(&self) -> Option<TypeId> {
        match self {
            Self::Resolved(id) => Some(*id),
            Self::Deferred(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    String,
    Int,
    Long,
    Decimal,
    Float,
    Boolean,
    Date,
    Time,
    DateTime,
}

impl Builtin {
    /// The variant name, used when emitting code.
    pub fn variant(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Long => "Long",
            Self::Decimal => "Decimal",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::DateTime => "DateTime",
        }
    }
}

/// XSD names mapped onto the scalar kinds they are stored as.
pub const BUILTINS: &[(&str, Builtin)] = &[
    ("string", Builtin::String),
    ("int", Builtin::Int),
    ("long", Builtin::Long),
    ("decimal", Builtin::Decimal),
    ("float", Builtin::Float),
    ("double", Builtin::Float),
    ("boolean", Builtin::Boolean),
    ("date", Builtin::Date),
    ("time", Builtin::Time),
    ("dateTime", Builtin::DateTime),
    ("integer", Builtin::Long),
    ("positiveInteger", Builtin::Long),
    ("nonNegativeInteger", Builtin::Long),
    ("short", Builtin::Int),
    ("unsignedInt", Builtin::Int),
    ("unsignedShort", Builtin::Int),
    ("unsignedByte", Builtin::Int),
    ("unsignedLong", Builtin::Long),
    ("char", Builtin::String),
    ("byte", Builtin::String),
    ("base64Binary", Builtin::String),
    ("hexBinary", Builtin::String),
    ("anyURI", Builtin::String),
    ("language", Builtin::String),
    ("token", Builtin::String),
    ("normalizedString", Builtin::String),
    ("duration", Builtin::String),
    ("QName", Builtin::String),
    ("ID", Builtin::String),
    ("IDREF", Builtin::String),
];

pub const ANY_TYPE: &str = "anyType";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unbounded" => Some(Self::Unbounded),
            value => value.trim().parse().ok().map(Self::Bounded),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub namespace: Option<String>,
    pub ty: TypeRef,
    pub required: bool,
    pub min: Option<u32>,
    pub max: Option<MaxOccurs>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            ty,
            required: false,
            min: None,
            max: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_max(mut self, max: MaxOccurs) -> Self {
        self.max = Some(max);
        self
    }

    pub fn is_multiple(&self) -> bool {
        match self.max {
            Some(MaxOccurs::Unbounded) => true,
            Some(MaxOccurs::Bounded(max)) => max > 1,
            None => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComplexType {
    /// Declaration order, inherited attributes first.
    pub attributes: Vec<FieldDescriptor>,
    /// Declaration order, inherited children first.
    pub children: Vec<FieldDescriptor>,
    pub content_type: Option<TypeRef>,
    /// Element name to substitute type, for substitution group heads.
    pub substitutions: Vec<(String, TypeRef)>,
    pub is_abstract: bool,
    /// Value emitted as `xsi:type` when this type derives from an abstract one.
    pub type_attr: Option<String>,
    pub any_attribute: bool,
}

impl ComplexType {
    pub fn attribute(&self, name: &str) -> Option<&FieldDescriptor> {
        self.attributes.iter().find(|field| field.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&FieldDescriptor> {
        self.children.iter().find(|field| field.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.attribute(name).or_else(|| self.child(name))
    }

    pub fn substitution(&self, element: &str) -> Option<&TypeRef> {
        self.substitutions
            .iter()
            .find(|(name, _)| name == element)
            .map(|(_, ty)| ty)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Kind {
    Simple(Builtin),
    Complex(ComplexType),
    Enum(Vec<String>),
    Array(TypeRef),
    List(TypeRef),
    Union,
    Any,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple(_) => "simple",
            Self::Complex(_) => "complex",
            Self::Enum(_) => "enumeration",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::Union => "union",
            Self::Any => "anyType",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeDescriptor {
    pub name: QName,
    /// Element name used when an instance is rendered outside a field.
    pub tag: Option<String>,
    /// Element namespace used when an instance is rendered outside a field.
    pub namespace: Option<String>,
    pub base: Option<TypeId>,
    pub kind: Kind,
}

impl TypeDescriptor {
    pub fn complex(&self) -> Option<&ComplexType> {
        match &self.kind {
            Kind::Complex(complex) => Some(complex),
            _ => None,
        }
    }

    /// Every reference this descriptor holds, excluding its base.
    pub fn refs(&self) -> Vec<&TypeRef> {
        match &self.kind {
            Kind::Complex(complex) => complex
                .attributes
                .iter()
                .chain(&complex.children)
                .map(|field| &field.ty)
                .chain(&complex.content_type)
                .chain(complex.substitutions.iter().map(|(_, ty)| ty))
                .collect(),
            Kind::Array(item) | Kind::List(item) => vec![item],
            _ => Vec::new(),
        }
    }

    fn refs_mut(&mut self) -> Vec<&mut TypeRef> {
        match &mut self.kind {
            Kind::Complex(complex) => complex
                .attributes
                .iter_mut()
                .chain(complex.children.iter_mut())
                .map(|field| &mut field.ty)
                .chain(complex.content_type.iter_mut())
                .chain(complex.substitutions.iter_mut().map(|(_, ty)| ty))
                .collect(),
            Kind::Array(item) | Kind::List(item) => vec![item],
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Slot {
    name: String,
    descriptor: Option<TypeDescriptor>,
}

/// Arena of every type known to a client.
///
/// Types are keyed by local name. A complex type reserves its slot before its
/// children are built so that self and mutually recursive references see a
/// name, and [`Registry::resolve_refs`] patches those names into ids once
/// everything is defined.
#[derive(Clone, Debug, PartialEq)]
pub struct Registry {
    slots: Vec<Slot>,
    names: HashMap<String, TypeId>,
    pending_substitutions: Vec<(String, String, TypeRef)>,
    builtins: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self {
            slots: Vec::new(),
            names: HashMap::new(),
            pending_substitutions: Vec::new(),
            builtins: 0,
        };

        for (name, builtin) in BUILTINS {
            registry.define(TypeDescriptor {
                name: QName::new(Some(ns::XSD), name),
                tag: None,
                namespace: None,
                base: None,
                kind: Kind::Simple(*builtin),
            });
        }

        registry.define(TypeDescriptor {
            name: QName::new(Some(ns::XSD), ANY_TYPE),
            tag: None,
            namespace: None,
            base: None,
            kind: Kind::Any,
        });

        registry.builtins = registry.slots.len();
        registry
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_builtin(&self, id: TypeId) -> bool {
        id < self.builtins
    }

    /// Claims a slot for `name` ahead of its definition.
    pub fn reserve(&mut self, name: &str) -> TypeId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }

        let id = self.slots.len();
        self.slots.push(Slot {
            name: name.to_owned(),
            descriptor: None,
        });
        self.names.insert(name.to_owned(), id);
        id
    }

    /// Fills the slot named by the descriptor. A name that is already defined
    /// keeps its first definition.
    pub fn define(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let name = descriptor.name.name.clone();
        let id = self.reserve(&name);

        if self.slots[id].descriptor.is_some() {
            log::trace!("Type {} is already defined, keeping the first definition", name);
            return id;
        }

        self.slots[id].descriptor = Some(descriptor);
        id
    }

    /// Names the element a defined type is rendered as, unless it already has one.
    pub fn lend_tag(&mut self, name: &str, tag: &str, namespace: Option<String>) -> bool {
        let descriptor = match self
            .names
            .get(name)
            .and_then(|id| self.slots[*id].descriptor.as_mut())
        {
            Some(descriptor) if descriptor.tag.is_none() => descriptor,
            _ => return false,
        };

        descriptor.tag = Some(tag.to_owned());
        descriptor.namespace = namespace;
        true
    }

    /// Whether `name` has a slot, defined or not.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.names
            .get(name)
            .map_or(false, |id| self.slots[*id].descriptor.is_some())
    }

    /// A resolved reference if `name` is defined, otherwise a deferred one.
    pub fn lookup(&self, name: &str) -> TypeRef {
        match self.names.get(name) {
            Some(id) if self.slots[*id].descriptor.is_some() => TypeRef::Resolved(*id),
            _ => TypeRef::Deferred(name.to_owned()),
        }
    }

    pub fn require(&self, name: &str) -> Result<TypeId, Error> {
        match self.lookup(name) {
            TypeRef::Resolved(id) => Ok(id),
            TypeRef::Deferred(name) => Err(Error::UnknownType(name)),
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.slots.get(id).and_then(|slot| slot.descriptor.as_ref())
    }

    pub fn descriptor(&self, id: TypeId) -> Result<&TypeDescriptor, Error> {
        match self.slots.get(id) {
            Some(Slot {
                descriptor: Some(descriptor),
                ..
            }) => Ok(descriptor),
            Some(slot) => Err(Error::UnresolvedType(slot.name.clone())),
            None => Err(Error::UnknownType(format!("#{}", id))),
        }
    }

    pub fn resolve(&self, ty: &TypeRef) -> Result<TypeId, Error> {
        match ty {
            TypeRef::Resolved(id) => Ok(*id),
            TypeRef::Deferred(name) => match self.lookup(name) {
                TypeRef::Resolved(id) => Ok(id),
                TypeRef::Deferred(name) => Err(Error::UnresolvedType(name)),
            },
        }
    }

    pub fn find(&self, name: &str) -> Result<(TypeId, &TypeDescriptor), Error> {
        let id = self.require(name)?;
        Ok((id, self.descriptor(id)?))
    }

    /// Like [`Registry::find`], but also checks the namespace.
    pub fn find_qualified(&self, name: &QName) -> Result<(TypeId, &TypeDescriptor), Error> {
        let (id, descriptor) = self.find(&name.name)?;
        if descriptor.name.namespace != name.namespace {
            return Err(Error::NamespaceMismatch {
                found: descriptor.name.qualified(),
                expected: name.namespace.clone(),
            });
        }

        Ok((id, descriptor))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.descriptor.as_ref().map(|descriptor| (id, descriptor)))
    }

    /// Whether `id` is `ancestor` or derives from it.
    pub fn is_a(&self, id: TypeId, ancestor: TypeId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|descriptor| descriptor.base);
        }

        false
    }

    /// Whether `id` or any of its bases is an abstract complex type.
    pub fn any_abstract(&self, id: TypeId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            let descriptor = self.get(id);
            if descriptor
                .and_then(TypeDescriptor::complex)
                .map_or(false, |complex| complex.is_abstract)
            {
                return true;
            }
            current = descriptor.and_then(|descriptor| descriptor.base);
        }

        false
    }

    /// Registers `element` as a substitute for the group headed by `head`.
    /// Heads that are not defined yet are patched in [`Registry::resolve_refs`].
    pub fn add_substitution(&mut self, head: &str, element: &str, ty: TypeRef) {
        if let Some(Kind::Complex(complex)) = self
            .names
            .get(head)
            .and_then(|id| self.slots[*id].descriptor.as_mut())
            .map(|descriptor| &mut descriptor.kind)
        {
            if complex.substitution(element).is_none() {
                complex.substitutions.push((element.to_owned(), ty));
            }
            return;
        }

        self.pending_substitutions
            .push((head.to_owned(), element.to_owned(), ty));
    }

    /// Replaces every deferred reference by the id of the type it names.
    pub fn resolve_refs(&mut self) -> Result<(), Error> {
        for (head, element, ty) in std::mem::take(&mut self.pending_substitutions) {
            if !self.is_defined(&head) {
                return Err(Error::UnresolvedType(head));
            }
            self.add_substitution(&head, &element, ty);
        }

        if let Some(slot) = self.slots.iter().find(|slot| slot.descriptor.is_none()) {
            return Err(Error::UnresolvedType(slot.name.clone()));
        }

        let Self { slots, names, .. } = self;
        for descriptor in slots.iter_mut().filter_map(|slot| slot.descriptor.as_mut()) {
            for ty in descriptor.refs_mut() {
                if let TypeRef::Deferred(name) = ty {
                    let id = names
                        .get(name.as_str())
                        .copied()
                        .ok_or_else(|| Error::UnresolvedType(name.clone()))?;
                    *ty = TypeRef::Resolved(id);
                }
            }
        }

        log::debug!("Resolved {} types", self.slots.len());
        Ok(())
    }
}
