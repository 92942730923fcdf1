use std::sync::{Arc, Mutex};

use lather_util::{
    soap::{Client, Method},
    transport::Transport,
    types::Registry,
};

use crate::{error::Error, loader::Source, parser};

/// Everything a service description defines: its types and its callable methods.
#[derive(Clone, Debug, PartialEq)]
pub struct Definition {
    pub target_namespace: Option<String>,
    pub registry: Arc<Registry>,
    pub methods: Vec<Method>,
}

impl Definition {
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// A dynamic client sharing this definition's registry.
    pub fn client<T: Transport>(&self, transport: T) -> Client<T> {
        Client::new(Arc::clone(&self.registry), self.methods.clone(), transport)
    }
}

/// Builds a [`Definition`] from loaded documents, once.
///
/// The build holds a lock for its whole duration; later calls share the
/// finished definition.
#[derive(Debug)]
pub struct Factory {
    sources: Vec<Source>,
    built: Mutex<Option<Arc<Definition>>>,
}

impl Factory {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources,
            built: Mutex::new(None),
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn build(&self) -> Result<Arc<Definition>, Error> {
        let mut built = self.built.lock().map_err(|_| Error::Poisoned)?;

        if let Some(definition) = built.as_ref() {
            return Ok(Arc::clone(definition));
        }

        let definition = Arc::new(parser::parse(&self.sources)?);
        *built = Some(Arc::clone(&definition));
        Ok(definition)
    }
}
