//! A plain, serializable form of [`Instance`] values.
//!
//! Saved values name their type by qualified name, so they can be restored
//! into any registry built from the same description, including one emitted
//! by code generation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::Error,
    types::{Kind, QName, Registry},
    value::{Data, Instance, Record, Scalar, Slot},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Saved {
    /// `{namespace}name` of the value's type.
    #[serde(rename = "type")]
    pub type_name: String,
    pub tag: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub position: usize,
    pub value: SavedValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavedValue {
    Text(String),
    Items(Vec<Saved>),
    Record {
        content: Option<String>,
        fields: BTreeMap<String, Vec<Saved>>,
        #[serde(default)]
        many: Vec<String>,
        #[serde(default)]
        extra: Vec<(String, String)>,
        counter: usize,
    },
}

impl Instance {
    pub fn save(&self, registry: &Registry) -> Result<Saved, Error> {
        let descriptor = registry.descriptor(self.ty)?;

        let value = match &self.data {
            Data::Array(items) => SavedValue::Items(
                items
                    .iter()
                    .map(|item| item.save(registry))
                    .collect::<Result<_, _>>()?,
            ),
            Data::Record(record) => {
                let mut fields = BTreeMap::new();
                let mut many = Vec::new();
                for (name, slot) in &record.fields {
                    if matches!(slot, Slot::Many(_)) {
                        many.push(name.clone());
                    }

                    let values = slot
                        .values()
                        .iter()
                        .map(|value| value.save(registry))
                        .collect::<Result<_, _>>()?;
                    fields.insert(name.clone(), values);
                }

                SavedValue::Record {
                    content: record.content.as_ref().map(ToString::to_string),
                    fields,
                    many,
                    extra: record.extra.clone(),
                    counter: record.counter,
                }
            }
            _ => SavedValue::Text(self.text()),
        };

        Ok(Saved {
            type_name: descriptor.name.qualified(),
            tag: self.tag.clone(),
            namespace: self.namespace.clone(),
            position: self.position,
            value,
        })
    }

    /// Rebuilds a saved value, checking its type exists in `registry`.
    pub fn restore(registry: &Registry, saved: &Saved) -> Result<Self, Error> {
        let (ty, descriptor) = registry.find_qualified(&QName::parse(&saved.type_name))?;

        let mismatch = || Error::Mismatch {
            from: "saved value",
            to: descriptor.name.name.clone(),
        };

        let data = match (&descriptor.kind, &saved.value) {
            (Kind::Simple(builtin), SavedValue::Text(text)) => Data::Scalar(Scalar::parse(*builtin, text)?),
            (Kind::Enum(_), SavedValue::Text(text)) => {
                Instance::new(registry, ty, text.as_str())?.data
            }
            (Kind::Union, SavedValue::Text(text)) => Data::Union(text.clone()),
            (Kind::Array(_) | Kind::List(_), SavedValue::Items(items)) => Data::Array(
                items
                    .iter()
                    .map(|item| Self::restore(registry, item))
                    .collect::<Result<_, _>>()?,
            ),
            (
                Kind::Complex(complex),
                SavedValue::Record {
                    content,
                    fields,
                    many,
                    extra,
                    counter,
                },
            ) => {
                let content = match (content, &complex.content_type) {
                    (None, _) => None,
                    (Some(text), Some(content_type)) => {
                        match &registry.descriptor(registry.resolve(content_type)?)?.kind {
                            Kind::Simple(builtin) => Some(Scalar::parse(*builtin, text)?),
                            _ => Some(Scalar::String(text.clone())),
                        }
                    }
                    (Some(text), None) => Some(Scalar::String(text.clone())),
                };

                let mut record = Record {
                    content,
                    extra: extra.clone(),
                    counter: *counter,
                    ..Record::default()
                };

                for (name, values) in fields {
                    if complex.field(name).is_none() {
                        return Err(Error::UnknownField {
                            type_name: descriptor.name.name.clone(),
                            field: name.clone(),
                        });
                    }

                    let mut values = values
                        .iter()
                        .map(|value| Self::restore(registry, value))
                        .collect::<Result<Vec<_>, _>>()?;

                    let slot = if many.contains(name) {
                        Slot::Many(values)
                    } else {
                        match values.pop() {
                            Some(value) => Slot::One(value),
                            None => continue,
                        }
                    };
                    record.fields.insert(name.clone(), slot);
                }

                Data::Record(record)
            }
            _ => return Err(mismatch()),
        };

        Ok(Self {
            ty,
            tag: saved.tag.clone(),
            namespace: saved.namespace.clone(),
            position: saved.position,
            data,
        })
    }

    pub fn to_json(&self, registry: &Registry) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.save(registry)?)?)
    }

    pub fn from_json(registry: &Registry, json: &str) -> Result<Self, Error> {
        let saved: Saved = serde_json::from_str(json)?;
        Self::restore(registry, &saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_support, value::Arg};

    fn album(registry: &Registry) -> Instance {
        let (ty, _) = registry.find("AlbumResult").unwrap();
        Instance::new(
            registry,
            ty,
            Arg::record([
                ("artist", Arg::from("U2")),
                ("album", Arg::from("Boy")),
                ("year", Arg::from(1980)),
                ("review", Arg::from(vec!["raw", "urgent"])),
                ("songs", Arg::from(vec!["I Will Follow", "Twilight"])),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn json_round_trip_keeps_structure() {
        let registry = test_support::registry();
        let original = album(&registry);

        let json = original.to_json(&registry).unwrap();
        let restored = Instance::from_json(&registry, &json).unwrap();

        assert_eq!(original, restored);
        assert_eq!(restored.get("songs").unwrap().items().len(), 2);
        assert_eq!(restored.get_all("review").len(), 2);
    }

    #[test]
    fn saved_type_is_qualified() {
        let registry = test_support::registry();
        let saved = album(&registry).save(&registry).unwrap();
        assert_eq!(saved.type_name, "{urn:LyricWiki}AlbumResult");
    }

    #[test]
    fn restore_rejects_foreign_namespaces() {
        let registry = test_support::registry();
        let mut saved = album(&registry).save(&registry).unwrap();
        saved.type_name = "{urn:elsewhere}AlbumResult".to_owned();
        assert!(matches!(
            Instance::restore(&registry, &saved),
            Err(Error::NamespaceMismatch { .. })
        ));
    }

    #[test]
    fn restore_rejects_unknown_types() {
        let registry = test_support::registry();
        let mut saved = album(&registry).save(&registry).unwrap();
        saved.type_name = "{urn:LyricWiki}Missing".to_owned();
        assert!(matches!(
            Instance::restore(&registry, &saved),
            Err(Error::UnknownType(_))
        ));
    }
}
