use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use roxmltree::Node;
use rust_decimal::Decimal;
use std::{collections::BTreeMap, fmt};

use crate::{
    error::Error,
    ns,
    types::{Builtin, ComplexType, FieldDescriptor, Kind, Registry, TypeDescriptor, TypeId},
    xml::Element,
};

/// A parsed scalar. Dates and times keep their UTC offset when one was given.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    String(String),
    Int(i64),
    Long(i128),
    Decimal(Decimal),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate, Option<FixedOffset>),
    Time(NaiveTime, Option<FixedOffset>),
    DateTime(NaiveDateTime, Option<FixedOffset>),
}

fn invalid(expected: &'static str, value: &str) -> Error {
    Error::InvalidValue {
        expected,
        value: value.to_owned(),
    }
}

/// Splits a trailing `Z` or `±hh:mm` offset from a lexical date or time.
fn split_offset(text: &str, min_len: usize) -> Result<(&str, Option<FixedOffset>), Error> {
    if let Some(main) = text.strip_suffix('Z') {
        return Ok((main, FixedOffset::east_opt(0)));
    }

    let split = text.len().saturating_sub(6);
    if text.len() >= min_len + 6 && text.is_char_boundary(split) {
        let (main, suffix) = text.split_at(split);
        let bytes = suffix.as_bytes();
        if matches!(bytes[0], b'+' | b'-') && bytes[3] == b':' {
            let hours: i32 = suffix[1..3].parse().map_err(|_| invalid("offset", text))?;
            let minutes: i32 = suffix[4..6].parse().map_err(|_| invalid("offset", text))?;
            let seconds = hours * 3600 + minutes * 60;
            let seconds = if bytes[0] == b'-' { -seconds } else { seconds };
            let offset = FixedOffset::east_opt(seconds).ok_or_else(|| invalid("offset", text))?;
            return Ok((main, Some(offset)));
        }
    }

    Ok((text, None))
}

fn write_offset(f: &mut fmt::Formatter, offset: &Option<FixedOffset>) -> fmt::Result {
    match offset {
        Some(offset) => write!(f, "{}", offset),
        None => Ok(()),
    }
}

impl Scalar {
    pub fn parse(builtin: Builtin, text: &str) -> Result<Self, Error> {
        let trimmed = text.trim();
        Ok(match builtin {
            Builtin::String => Self::String(text.to_owned()),
            Builtin::Int => Self::Int(trimmed.parse().map_err(|_| invalid("int", text))?),
            Builtin::Long => Self::Long(trimmed.parse().map_err(|_| invalid("long", text))?),
            // At most 28 significant digits; longer values are rejected.
            Builtin::Decimal => {
                Self::Decimal(trimmed.parse().map_err(|_| invalid("decimal", text))?)
            }
            Builtin::Float => Self::Float(match trimmed {
                "INF" => f64::INFINITY,
                "-INF" => f64::NEG_INFINITY,
                other => other.parse().map_err(|_| invalid("float", text))?,
            }),
            Builtin::Boolean => {
                Self::Boolean(matches!(trimmed.to_ascii_lowercase().as_str(), "true" | "1"))
            }
            Builtin::Date => {
                let (main, offset) = split_offset(trimmed, 10)?;
                let date = NaiveDate::parse_from_str(main, "%Y-%m-%d")
                    .map_err(|_| invalid("date", text))?;
                Self::Date(date, offset)
            }
            Builtin::Time => {
                let (main, offset) = split_offset(trimmed, 8)?;
                let time = NaiveTime::parse_from_str(main, "%H:%M:%S%.f")
                    .map_err(|_| invalid("time", text))?;
                Self::Time(time.with_nanosecond(0).unwrap_or(time), offset)
            }
            Builtin::DateTime => {
                let (main, offset) = split_offset(trimmed, 19)?;
                let datetime = NaiveDateTime::parse_from_str(main, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(main, "%Y-%m-%d %H:%M:%S%.f"))
                    .or_else(|_| {
                        NaiveDate::parse_from_str(main, "%Y-%m-%d")
                            .map(|date| date.and_time(NaiveTime::default()))
                    })
                    .map_err(|_| invalid("dateTime", text))?;
                Self::DateTime(datetime.with_nanosecond(0).unwrap_or(datetime), offset)
            }
        })
    }

    /// Converts a caller supplied argument into the scalar kind `builtin`.
    pub fn coerce(builtin: Builtin, arg: Arg) -> Result<Self, Error> {
        match (builtin, arg) {
            (builtin, Arg::Text(text)) => Self::parse(builtin, &text),
            (Builtin::Int, Arg::Int(value)) => Ok(Self::Int(value)),
            (Builtin::Long, Arg::Int(value)) => Ok(Self::Long(i128::from(value))),
            (Builtin::Float, Arg::Int(value)) => Ok(Self::Float(value as f64)),
            (Builtin::Float, Arg::Float(value)) => Ok(Self::Float(value)),
            (Builtin::Decimal, Arg::Int(value)) => Ok(Self::Decimal(Decimal::from(value))),
            (Builtin::Decimal, Arg::Decimal(value)) => Ok(Self::Decimal(value)),
            (Builtin::Boolean, Arg::Bool(value)) => Ok(Self::Boolean(value)),
            (Builtin::Boolean, Arg::Int(value)) => Ok(Self::Boolean(value == 1)),
            (builtin, arg) => match arg.text() {
                Some(text) => Self::parse(builtin, &text),
                None => Err(Error::Mismatch {
                    from: arg.kind_name(),
                    to: builtin.variant().to_owned(),
                }),
            },
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::String(value) => !value.is_empty(),
            Self::Int(value) => *value != 0,
            Self::Long(value) => *value != 0,
            Self::Decimal(value) => !value.is_zero(),
            Self::Float(value) => *value != 0.0,
            Self::Boolean(value) => *value,
            Self::Date(..) | Self::Time(..) | Self::DateTime(..) => true,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Long(value) => write!(f, "{}", value),
            Self::Decimal(value) => write!(f, "{}", value),
            Self::Float(value) if value.is_infinite() => {
                f.write_str(if *value > 0.0 { "INF" } else { "-INF" })
            }
            Self::Float(value) => write!(f, "{}", value),
            Self::Boolean(value) => write!(f, "{}", value),
            Self::Date(date, offset) => {
                write!(f, "{}", date.format("%Y-%m-%d"))?;
                write_offset(f, offset)
            }
            Self::Time(time, offset) => {
                write!(f, "{}", time.format("%H:%M:%S"))?;
                write_offset(f, offset)
            }
            Self::DateTime(datetime, offset) => {
                write!(f, "{}", datetime.format("%Y-%m-%dT%H:%M:%S"))?;
                write_offset(f, offset)
            }
        }
    }
}

/// A value supplied by a caller, before it is coerced into a registry type.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Decimal(Decimal),
    Instance(Instance),
    List(Vec<Arg>),
    Record(Vec<(String, Arg)>),
}

impl Arg {
    pub fn record<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "boolean",
            Self::Decimal(_) => "decimal",
            Self::Instance(_) => "instance",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }

    /// The lexical form of a scalar argument.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Text(value) => Some(value.clone()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Bool(value) => Some(value.to_string()),
            Self::Decimal(value) => Some(value.to_string()),
            Self::Instance(instance) if !instance.is_record() => Some(instance.text()),
            _ => None,
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Decimal> for Arg {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<Instance> for Arg {
    fn from(value: Instance) -> Self {
        Self::Instance(value)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    Scalar(Scalar),
    Enum(String),
    Union(String),
    Array(Vec<Instance>),
    Record(Record),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    One(Instance),
    Many(Vec<Instance>),
}

impl Slot {
    pub fn values(&self) -> &[Instance] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }
}

/// Field storage of a complex instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub(crate) content: Option<Scalar>,
    pub(crate) fields: BTreeMap<String, Slot>,
    pub(crate) extra: Vec<(String, String)>,
    pub(crate) counter: usize,
}

impl Record {
    fn next_position(&mut self) -> usize {
        let position = self.counter;
        self.counter += 1;
        position
    }

    fn store(&mut self, name: &str, value: Instance, multiple: bool) {
        let slot = match self.fields.remove(name) {
            Some(Slot::One(previous)) if multiple => Slot::Many(vec![previous, value]),
            Some(Slot::Many(mut previous)) if multiple => {
                previous.push(value);
                Slot::Many(previous)
            }
            _ => Slot::One(value),
        };
        self.fields.insert(name.to_owned(), slot);
    }

    pub fn content(&self) -> Option<&Scalar> {
        self.content.as_ref()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.fields.iter().map(|(name, slot)| (name.as_str(), slot))
    }

    pub fn extra_attributes(&self) -> &[(String, String)] {
        &self.extra
    }
}

/// A value of some registry type, carrying the element name and namespace
/// it renders under.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub(crate) ty: TypeId,
    pub(crate) tag: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) position: usize,
    pub(crate) data: Data,
}

fn check_enum(descriptor: &TypeDescriptor, values: &[String], value: String) -> Result<String, Error> {
    let legal = |token: &str| values.iter().any(|allowed| allowed == token);

    if legal(&value) || (value.contains(' ') && value.split(' ').all(|part| legal(part.trim()))) {
        Ok(value)
    } else {
        Err(Error::IllegalEnumValue {
            type_name: descriptor.name.name.clone(),
            value,
            allowed: values.to_vec(),
        })
    }
}

fn xsi_type<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.attributes()
        .find(|attribute| attribute.name() == "type")
        .map(|attribute| ns::local(attribute.value()))
}

/// Follows an `href="#id"` link to the `multiRef` element it names, searching
/// the children of each ancestor from the nearest outwards.
pub fn resolve_multiref<'a, 'input>(node: Node<'a, 'input>) -> Result<Node<'a, 'input>, Error> {
    let href = match node.attribute("href") {
        Some(href) => href,
        None => return Ok(node),
    };

    let id = href
        .strip_prefix('#')
        .ok_or_else(|| Error::UnsupportedHref(href.to_owned()))?;

    for ancestor in node.ancestors().skip(1) {
        let found = ancestor.children().find(|child| {
            child.is_element()
                && child.tag_name().name() == "multiRef"
                && child.attribute("id") == Some(id)
        });

        if let Some(found) = found {
            return Ok(found);
        }
    }

    Err(Error::MultirefNotFound(href.to_owned()))
}

fn has_content(node: Node) -> bool {
    node.text().is_some()
        || node.attributes().next().is_some()
        || node.children().any(|child| child.is_element())
}

impl Instance {
    fn blank(descriptor: &TypeDescriptor, ty: TypeId, data: Data) -> Self {
        Self {
            ty,
            tag: descriptor.tag.clone(),
            namespace: descriptor.namespace.clone(),
            position: 0,
            data,
        }
    }

    /// Builds an instance of `ty` from a caller supplied argument.
    pub fn new(registry: &Registry, ty: TypeId, arg: impl Into<Arg>) -> Result<Self, Error> {
        let descriptor = registry.descriptor(ty)?;

        let arg = match arg.into() {
            Arg::Instance(instance) => return Self::adopt(registry, ty, instance),
            arg => arg,
        };

        let data = match &descriptor.kind {
            Kind::Simple(builtin) => Data::Scalar(Scalar::coerce(*builtin, arg)?),
            Kind::Enum(values) => {
                let value = arg.text().ok_or_else(|| Error::Mismatch {
                    from: arg.kind_name(),
                    to: descriptor.name.name.clone(),
                })?;
                Data::Enum(check_enum(descriptor, values, value)?)
            }
            Kind::Union => Data::Union(arg.text().ok_or_else(|| Error::Mismatch {
                from: arg.kind_name(),
                to: descriptor.name.name.clone(),
            })?),
            Kind::Array(item) | Kind::List(item) => {
                let item = registry.resolve(item)?;
                let args = match arg {
                    Arg::List(args) => args,
                    Arg::Text(text) if matches!(descriptor.kind, Kind::List(_)) => {
                        text.split_whitespace().map(Arg::from).collect()
                    }
                    other => {
                        return Err(Error::Mismatch {
                            from: other.kind_name(),
                            to: descriptor.name.name.clone(),
                        })
                    }
                };

                Data::Array(
                    args.into_iter()
                        .map(|arg| Self::new(registry, item, arg))
                        .collect::<Result<_, _>>()?,
                )
            }
            Kind::Complex(complex) => {
                let mut instance = Self::blank(descriptor, ty, Data::Record(Record::default()));
                match arg {
                    Arg::Record(fields) => {
                        for (name, value) in fields {
                            instance.set(registry, &name, value)?;
                        }
                    }
                    arg => instance.set_content(registry, complex, arg)?,
                }
                return Ok(instance);
            }
            Kind::Any => {
                return Err(Error::Mismatch {
                    from: arg.kind_name(),
                    to: descriptor.name.name.clone(),
                })
            }
        };

        Ok(Self::blank(descriptor, ty, data))
    }

    /// Keeps an instance that already is a `ty`, converting anything else by value.
    fn adopt(registry: &Registry, ty: TypeId, instance: Instance) -> Result<Self, Error> {
        let descriptor = registry.descriptor(ty)?;
        if registry.is_a(instance.ty, ty) || descriptor.kind == Kind::Any {
            return Ok(instance);
        }

        if instance.is_record() {
            return Err(Error::Mismatch {
                from: "instance",
                to: descriptor.name.name.clone(),
            });
        }

        Self::new(registry, ty, Arg::Text(instance.text()))
    }

    fn set_content(&mut self, registry: &Registry, complex: &ComplexType, arg: Arg) -> Result<(), Error> {
        let content = match &complex.content_type {
            Some(content_type) => {
                let content_id = registry.resolve(content_type)?;
                match &registry.descriptor(content_id)?.kind {
                    Kind::Simple(builtin) => Scalar::coerce(*builtin, arg)?,
                    _ => Scalar::String(Self::new(registry, content_id, arg)?.text()),
                }
            }
            None => Scalar::String(arg.text().ok_or_else(|| Error::Mismatch {
                from: arg.kind_name(),
                to: "content".to_owned(),
            })?),
        };

        self.record_mut()?.content = Some(content);
        Ok(())
    }

    /// An empty value for a field of type `ty`, or `None` for non-complex kinds.
    pub fn empty(registry: &Registry, ty: TypeId) -> Result<Option<Self>, Error> {
        let descriptor = registry.descriptor(ty)?;
        Ok(match descriptor.kind {
            Kind::Complex(_) => Some(Self::blank(descriptor, ty, Data::Record(Record::default()))),
            _ => None,
        })
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn set_context(&mut self, tag: Option<String>, namespace: Option<String>) {
        self.tag = tag;
        self.namespace = namespace;
    }

    pub fn is_record(&self) -> bool {
        matches!(self.data, Data::Record(_))
    }

    pub fn record(&self) -> Option<&Record> {
        match &self.data {
            Data::Record(record) => Some(record),
            _ => None,
        }
    }

    fn record_mut(&mut self) -> Result<&mut Record, Error> {
        match &mut self.data {
            Data::Record(record) => Ok(record),
            _ => Err(Error::Mismatch {
                from: "scalar",
                to: "record".to_owned(),
            }),
        }
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match &self.data {
            Data::Scalar(scalar) => Some(scalar),
            Data::Record(record) => record.content.as_ref(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::Scalar(Scalar::String(value)) | Data::Enum(value) | Data::Union(value) => {
                Some(value)
            }
            Data::Record(Record {
                content: Some(Scalar::String(value)),
                ..
            }) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.scalar() {
            Some(Scalar::Int(value)) => Some(*value),
            Some(Scalar::Long(value)) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.scalar() {
            Some(Scalar::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn items(&self) -> &[Instance] {
        match &self.data {
            Data::Array(items) => items,
            _ => &[],
        }
    }

    /// Lexical form, as it would appear in element text.
    pub fn text(&self) -> String {
        match &self.data {
            Data::Scalar(scalar) => scalar.to_string(),
            Data::Enum(value) | Data::Union(value) => value.clone(),
            Data::Array(items) => items
                .iter()
                .map(Instance::text)
                .collect::<Vec<_>>()
                .join(" "),
            Data::Record(record) => record
                .content
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    /// A complex instance is truthy when it has content or any stored field.
    pub fn is_truthy(&self) -> bool {
        match &self.data {
            Data::Scalar(scalar) => scalar.is_truthy(),
            Data::Enum(value) | Data::Union(value) => !value.is_empty(),
            Data::Array(items) => !items.is_empty(),
            Data::Record(record) => {
                record.content.as_ref().map_or(false, Scalar::is_truthy)
                    || !record.fields.is_empty()
                    || !record.extra.is_empty()
            }
        }
    }

    /// Yields the instance itself only when it is truthy.
    pub fn iter_self(&self) -> impl Iterator<Item = &Instance> {
        self.is_truthy().then_some(self).into_iter()
    }

    fn field<'r>(&self, registry: &'r Registry, name: &str) -> Result<&'r FieldDescriptor, Error> {
        let descriptor = registry.descriptor(self.ty)?;
        descriptor
            .complex()
            .and_then(|complex| complex.field(name))
            .ok_or_else(|| Error::UnknownField {
                type_name: descriptor.name.name.clone(),
                field: name.to_owned(),
            })
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.get_all(name).first()
    }

    /// Every value stored under `name`, in assignment order.
    pub fn get_all(&self, name: &str) -> &[Instance] {
        self.record()
            .and_then(|record| record.fields.get(name))
            .map(Slot::values)
            .unwrap_or(&[])
    }

    /// Stores a value under a declared field, coercing it to the field's type.
    ///
    /// Assigning again to a multi-valued field appends instead of replacing.
    pub fn set(&mut self, registry: &Registry, name: &str, value: impl Into<Arg>) -> Result<(), Error> {
        let field = self.field(registry, name)?;
        let field_ty = registry.resolve(&field.ty)?;
        let sequence_type = matches!(
            registry.descriptor(field_ty)?.kind,
            Kind::Array(_) | Kind::List(_)
        );

        match value.into() {
            Arg::List(args) if !sequence_type => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(Self::new(registry, field_ty, arg)?);
                }

                let record = self.record_mut()?;
                for value in &mut values {
                    value.set_context(Some(field.name.clone()), field.namespace.clone());
                    value.position = record.next_position();
                }
                record.fields.insert(name.to_owned(), Slot::Many(values));
            }
            arg => {
                let value = Self::new(registry, field_ty, arg)?;
                self.assign(field, value)?;
            }
        }

        Ok(())
    }

    fn assign(&mut self, field: &FieldDescriptor, mut value: Instance) -> Result<(), Error> {
        value.set_context(Some(field.name.clone()), field.namespace.clone());
        let record = self.record_mut()?;
        value.position = record.next_position();
        record.store(&field.name, value, field.is_multiple());
        Ok(())
    }

    /// The value under `name`, creating an empty complex value if unset.
    /// Returns `None` for unset fields of non-complex types.
    pub fn get_or_create_empty(&mut self, registry: &Registry, name: &str) -> Result<Option<&mut Instance>, Error> {
        let field = self.field(registry, name)?;
        let field_ty = registry.resolve(&field.ty)?;
        let record = self.record_mut()?;

        if !record.fields.contains_key(name) {
            match Self::empty(registry, field_ty)? {
                Some(mut value) => {
                    value.set_context(Some(field.name.clone()), field.namespace.clone());
                    record.fields.insert(name.to_owned(), Slot::One(value));
                }
                None => return Ok(None),
            }
        }

        Ok(match record.fields.get_mut(name) {
            Some(Slot::One(value)) => Some(value),
            Some(Slot::Many(values)) => values.last_mut(),
            None => None,
        })
    }

    /// Parses `node` as a `ty`. Returns `None` for elements that carry no value.
    pub fn from_xml(registry: &Registry, ty: TypeId, node: Node) -> Result<Option<Self>, Error> {
        let node = resolve_multiref(node)?;
        let descriptor = registry.descriptor(ty)?;

        let data = match &descriptor.kind {
            Kind::Any => return Self::from_xml_any(registry, node),
            Kind::Simple(builtin) => match node.text() {
                Some(text) => Data::Scalar(Scalar::parse(*builtin, text)?),
                None if *builtin == Builtin::String => Data::Scalar(Scalar::String(String::new())),
                None => return Ok(None),
            },
            Kind::Enum(values) => match node.text() {
                Some(text) => Data::Enum(check_enum(descriptor, values, text.to_owned())?),
                None => return Ok(None),
            },
            Kind::Union => Data::Union(node.text().unwrap_or_default().to_owned()),
            Kind::Array(item) => {
                let item = registry.resolve(item)?;
                let mut items = Vec::new();
                for child in node.children().filter(Node::is_element) {
                    if let Some(value) = Self::from_xml(registry, item, child)? {
                        items.push(value);
                    }
                }
                Data::Array(items)
            }
            Kind::List(item) => {
                let item = registry.resolve(item)?;
                Data::Array(
                    node.text()
                        .unwrap_or_default()
                        .split_whitespace()
                        .map(|token| Self::new(registry, item, token))
                        .collect::<Result<_, _>>()?,
                )
            }
            Kind::Complex(complex) => {
                if complex.is_abstract {
                    if let Some(name) = xsi_type(node) {
                        let (concrete, _) = registry.find(name)?;
                        if concrete != ty {
                            return Self::from_xml(registry, concrete, node);
                        }
                    }
                }

                let mut instance = Self::blank(descriptor, ty, Data::Record(Record::default()));
                instance.parse_record(registry, complex, node)?;
                return Ok(Some(instance));
            }
        };

        Ok(Some(Self::blank(descriptor, ty, data)))
    }

    fn from_xml_any(registry: &Registry, node: Node) -> Result<Option<Self>, Error> {
        let name = match xsi_type(node) {
            Some(name) => name,
            None => return Ok(None),
        };

        let (concrete, descriptor) = registry.find(name)?;
        if descriptor.kind == Kind::Any {
            return Ok(None);
        }

        Self::from_xml(registry, concrete, node)
    }

    fn parse_record(&mut self, registry: &Registry, complex: &ComplexType, node: Node) -> Result<(), Error> {
        if let Some(text) = node.text().filter(|text| !text.trim().is_empty()) {
            let content = match &complex.content_type {
                Some(content_type) => {
                    let content_id = registry.resolve(content_type)?;
                    match &registry.descriptor(content_id)?.kind {
                        Kind::Simple(builtin) => Scalar::parse(*builtin, text)?,
                        _ => Scalar::String(text.to_owned()),
                    }
                }
                None => Scalar::String(text.to_owned()),
            };
            self.record_mut()?.content = Some(content);
        }

        for attribute in node.attributes() {
            if attribute.namespace().is_some() {
                continue;
            }

            match complex.attribute(attribute.name()) {
                Some(field) => {
                    let field_ty = registry.resolve(&field.ty)?;
                    let value = Self::new(registry, field_ty, attribute.value())?;
                    self.assign(field, value)?;
                }
                None if complex.any_attribute => self
                    .record_mut()?
                    .extra
                    .push((attribute.name().to_owned(), attribute.value().to_owned())),
                None => log::trace!("Ignoring undeclared attribute {}", attribute.name()),
            }
        }

        for child in node.children().filter(Node::is_element) {
            if !has_content(child) {
                continue;
            }

            let name = child.tag_name().name();
            let (field, field_ty) = match complex.child(name) {
                Some(field) => (field, registry.resolve(&field.ty)?),
                None => match self.substitute(registry, complex, name)? {
                    Some(found) => found,
                    None => {
                        log::trace!("Ignoring undeclared element {}", name);
                        continue;
                    }
                },
            };

            if let Some(value) = Self::from_xml(registry, field_ty, child)? {
                self.assign(field, value)?;
            }
        }

        Ok(())
    }

    /// Finds the child field whose type heads a substitution group containing `element`.
    fn substitute<'c>(&self, registry: &Registry, complex: &'c ComplexType, element: &str) -> Result<Option<(&'c FieldDescriptor, TypeId)>, Error> {
        for field in &complex.children {
            let field_ty = registry.resolve(&field.ty)?;
            let substitution = registry
                .descriptor(field_ty)?
                .complex()
                .and_then(|head| head.substitution(element));

            if let Some(substitution) = substitution {
                return Ok(Some((field, registry.resolve(substitution)?)));
            }
        }

        Ok(None)
    }

    /// Renders the instance as an element named `tag`, or its own tag.
    ///
    /// Unless `empty` is set, a complex value with nothing to render yields `None`.
    pub fn to_xml(&self, registry: &Registry, tag: Option<&str>, empty: bool) -> Result<Option<Element>, Error> {
        let descriptor = registry.descriptor(self.ty)?;
        let tag = tag
            .or(self.tag.as_deref())
            .ok_or_else(|| Error::NoTag(descriptor.name.name.clone()))?;

        let mut element = Element::new(tag, self.namespace.clone());

        match &self.data {
            Data::Scalar(_) | Data::Enum(_) | Data::Union(_) => element.set_text(self.text()),
            Data::Array(_) if matches!(descriptor.kind, Kind::List(_)) => {
                element.set_text(self.text())
            }
            Data::Array(items) => {
                for item in items {
                    if let Some(child) = item.to_xml(registry, Some("item"), empty)? {
                        element.children.push(child);
                    }
                }
            }
            Data::Record(record) => {
                let complex = descriptor.complex().ok_or_else(|| Error::Mismatch {
                    from: "record",
                    to: descriptor.name.name.clone(),
                })?;

                if let Some(type_attr) = &complex.type_attr {
                    element.set_attribute("xsi:type", type_attr);
                }

                if let Some(content) = &record.content {
                    element.set_text(content.to_string());
                }

                for field in &complex.attributes {
                    if let Some(value) = record.fields.get(&field.name) {
                        let text = value
                            .values()
                            .iter()
                            .map(Instance::text)
                            .collect::<Vec<_>>()
                            .join(" ");
                        element.set_attribute(&field.name, &text);
                    }
                }

                for (name, value) in &record.extra {
                    element.set_attribute(name, value);
                }

                for field in &complex.children {
                    if let Some(slot) = record.fields.get(&field.name) {
                        for value in slot.values() {
                            if let Some(child) = value.to_xml(registry, Some(&field.name), empty)? {
                                element.children.push(child);
                            }
                        }
                    }
                }

                if !empty && element.is_empty() {
                    return Ok(None);
                }
            }
        }

        Ok(Some(element))
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text())
    }
}
