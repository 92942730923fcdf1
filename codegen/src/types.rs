use std::collections::{BTreeMap, BTreeSet};

use lather_util::{
    soap::Method,
    types::{TypeDescriptor, TypeId},
};

/// A type at its place in emission order.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: TypeId,
    pub descriptor: TypeDescriptor,
    /// Referenced types that are not declared yet, looked up by name once
    /// every declaration is in.
    pub deferred: BTreeSet<TypeId>,
}

#[derive(Default, Debug, Clone)]
pub struct Definition {
    pub target_namespace: Option<String>,
    /// Local name of every type, builtins included.
    pub names: BTreeMap<TypeId, String>,
    pub builtins: BTreeSet<TypeId>,
    pub declarations: Vec<Declaration>,
    pub methods: Vec<Method>,
}

impl Definition {
    pub fn name(&self, id: TypeId) -> &str {
        self.names.get(&id).map(String::as_str).unwrap_or_default()
    }
}
