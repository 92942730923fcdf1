use std::collections::{BTreeMap, BTreeSet, HashMap};

use lather_util::types::{Registry, TypeId};
use lather_wsdl::types as wsdl;

use super::{error::Error, types};

/// Every non-builtin type `id` needs declared before it: its base and the
/// types its fields, content and substitutions refer to.
fn dependencies(registry: &Registry, id: TypeId) -> Result<BTreeSet<TypeId>, Error> {
    let descriptor = registry.descriptor(id)?;

    let mut dependencies = BTreeSet::new();
    dependencies.extend(descriptor.base);
    for ty in descriptor.refs() {
        dependencies.insert(registry.resolve(ty)?);
    }

    dependencies.retain(|dependency| !registry.is_builtin(*dependency));
    Ok(dependencies)
}

/// Orders the registry for emission.
///
/// A type is declared once everything it depends on is. When only cycles
/// are left, the lowest pending type whose base is declared goes next, its
/// other missing dependencies becoming deferred lookups. A pending type
/// whose base never gets declared is an inheritance cycle.
pub fn preprocess(definition: &wsdl::Definition) -> Result<types::Definition, Error> {
    let registry = &definition.registry;

    let mut names = BTreeMap::new();
    let mut builtins = BTreeSet::new();
    let mut waiting: BTreeMap<TypeId, BTreeSet<TypeId>> = BTreeMap::new();
    let mut dependents: HashMap<TypeId, Vec<TypeId>> = HashMap::new();

    for (id, descriptor) in registry.iter() {
        names.insert(id, descriptor.name.name.clone());

        if registry.is_builtin(id) {
            builtins.insert(id);
            continue;
        }

        let dependencies = dependencies(registry, id)?;
        for dependency in &dependencies {
            dependents.entry(*dependency).or_default().push(id);
        }
        waiting.insert(id, dependencies);
    }

    let mut ready: BTreeSet<TypeId> = waiting
        .iter()
        .filter(|(_, dependencies)| dependencies.is_empty())
        .map(|(id, _)| *id)
        .collect();

    let mut declarations = Vec::with_capacity(waiting.len());

    while !waiting.is_empty() {
        let (id, deferred) = match ready.iter().next().copied() {
            Some(id) => {
                ready.remove(&id);
                (id, BTreeSet::new())
            }
            None => {
                let next = waiting.iter().find(|(id, dependencies)| {
                    registry
                        .get(**id)
                        .and_then(|descriptor| descriptor.base)
                        .map_or(true, |base| !dependencies.contains(&base))
                });

                match next {
                    Some((id, dependencies)) => {
                        log::debug!(
                            "Deferring {} references of {}",
                            dependencies.len(),
                            names.get(id).map(String::as_str).unwrap_or_default()
                        );
                        (*id, dependencies.clone())
                    }
                    None => {
                        return Err(Error::BaseCycle(
                            waiting.keys().filter_map(|id| names.get(id).cloned()).collect(),
                        ))
                    }
                }
            }
        };

        waiting.remove(&id);
        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(dependencies) = waiting.get_mut(dependent) {
                dependencies.remove(&id);
                if dependencies.is_empty() {
                    ready.insert(*dependent);
                }
            }
        }

        declarations.push(types::Declaration {
            id,
            descriptor: registry.descriptor(id)?.clone(),
            deferred,
        });
    }

    Ok(types::Definition {
        target_namespace: definition.target_namespace.clone(),
        names,
        builtins,
        declarations,
        methods: definition.methods.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lather_util::types::{ComplexType, FieldDescriptor, Kind, QName, TypeDescriptor, TypeRef};
    use std::sync::Arc;

    fn complex(name: &str, base: Option<TypeId>, children: &[(&str, &str)]) -> TypeDescriptor {
        TypeDescriptor {
            name: QName::new(Some("urn:test"), name),
            tag: None,
            namespace: None,
            base,
            kind: Kind::Complex(ComplexType {
                children: children
                    .iter()
                    .map(|(field, ty)| FieldDescriptor::new(*field, TypeRef::deferred(*ty)))
                    .collect(),
                ..ComplexType::default()
            }),
        }
    }

    fn definition(registry: Registry) -> wsdl::Definition {
        wsdl::Definition {
            target_namespace: Some("urn:test".to_owned()),
            registry: Arc::new(registry),
            methods: Vec::new(),
        }
    }

    fn order(definition: &types::Definition) -> Vec<&str> {
        definition
            .declarations
            .iter()
            .map(|declaration| declaration.descriptor.name.name.as_str())
            .collect()
    }

    #[test]
    fn dependencies_come_first() {
        let mut registry = Registry::new();
        registry.define(complex("Album", None, &[("artist", "Artist"), ("title", "string")]));
        registry.define(complex("Artist", None, &[("name", "string")]));
        registry.resolve_refs().unwrap();

        let definition = preprocess(&definition(registry)).unwrap();
        assert_eq!(order(&definition), ["Artist", "Album"]);
        assert!(definition.declarations.iter().all(|declaration| declaration.deferred.is_empty()));
    }

    #[test]
    fn cycles_are_deferred() {
        let mut registry = Registry::new();
        let node = registry.define(complex("Node", None, &[("next", "Node")]));
        registry.define(complex("Keeper", None, &[("enclosure", "Enclosure")]));
        let enclosure = registry.define(complex("Enclosure", None, &[("keeper", "Keeper")]));
        registry.resolve_refs().unwrap();

        let definition = preprocess(&definition(registry)).unwrap();
        assert_eq!(order(&definition), ["Node", "Keeper", "Enclosure"]);

        let deferred: Vec<_> = definition
            .declarations
            .iter()
            .map(|declaration| declaration.deferred.iter().copied().collect::<Vec<_>>())
            .collect();
        assert_eq!(deferred, [vec![node], vec![enclosure], vec![]]);
    }

    #[test]
    fn bases_are_never_deferred() {
        let mut registry = Registry::new();
        let animal = registry.define(complex("Animal", None, &[("owner", "Owner")]));
        registry.define(complex("Owner", None, &[("pet", "Dog")]));
        registry.define(complex("Dog", Some(animal), &[("owner", "Owner")]));
        registry.resolve_refs().unwrap();

        let definition = preprocess(&definition(registry)).unwrap();
        let position = |name: &str| order(&definition).iter().position(|declared| *declared == name).unwrap();
        assert!(position("Animal") < position("Dog"));
    }

    #[test]
    fn inheritance_cycles_are_fatal() {
        let mut registry = Registry::new();
        let first = registry.reserve("First");
        let second = registry.reserve("Second");
        registry.define(complex("First", Some(second), &[]));
        registry.define(complex("Second", Some(first), &[]));

        let result = preprocess(&definition(registry));
        assert!(matches!(result, Err(Error::BaseCycle(names)) if names == ["First", "Second"]));
    }
}
