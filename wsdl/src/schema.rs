use roxmltree::Node;

/// One `<schema>` scope: where its declarations live and how they qualify.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    pub target_namespace: Option<String>,
    /// `elementFormDefault="qualified"`: local elements take the target namespace.
    pub qualified: bool,
    pub prefixes: Vec<(Option<String>, String)>,
}

impl Schema {
    pub fn from_node(node: Node) -> Self {
        Self {
            target_namespace: node.attribute("targetNamespace").map(ToOwned::to_owned),
            qualified: node.attribute("elementFormDefault") == Some("qualified"),
            prefixes: node
                .namespaces()
                .map(|namespace| {
                    (
                        namespace.name().map(ToOwned::to_owned),
                        namespace.uri().to_owned(),
                    )
                })
                .collect(),
        }
    }

    /// Namespace of local elements declared in this scope.
    pub fn element_namespace(&self) -> Option<String> {
        if self.qualified {
            self.target_namespace.clone()
        } else {
            None
        }
    }

    pub fn resolve_prefix(&self, prefix: Option<&str>) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|(name, _)| name.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

/// Schema scopes entered while walking, innermost last.
#[derive(Clone, Debug, Default)]
pub struct SchemaStack {
    scopes: Vec<Schema>,
}

impl SchemaStack {
    pub fn push(&mut self, schema: Schema) {
        log::trace!("Entering schema {:?}", schema.target_namespace);
        self.scopes.push(schema);
    }

    pub fn pop(&mut self) -> Option<Schema> {
        self.scopes.pop()
    }

    pub fn top(&self) -> Option<&Schema> {
        self.scopes.last()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// The innermost declared target namespace.
    pub fn target_namespace(&self) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|schema| schema.target_namespace.as_deref())
    }

    /// Resolves a `prefix:name` reference against the innermost scope declaring the prefix.
    pub fn resolve<'n>(&self, qname: &'n str) -> (Option<&str>, &'n str) {
        let (prefix, local) = match qname.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, qname),
        };

        let namespace = self
            .scopes
            .iter()
            .rev()
            .find_map(|schema| schema.resolve_prefix(prefix));

        (namespace, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    #[test]
    fn scopes_nest() {
        let document = Document::parse(
            r#"<definitions xmlns:tns="urn:outer" targetNamespace="urn:outer">
                 <schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:inner" elementFormDefault="qualified"/>
               </definitions>"#,
        )
        .unwrap();

        let root = document.root_element();
        let inner = root.children().find(|node| node.is_element()).unwrap();

        let mut stack = SchemaStack::default();
        stack.push(Schema::from_node(root));
        assert_eq!(stack.target_namespace(), Some("urn:outer"));

        stack.push(Schema::from_node(inner));
        assert_eq!(stack.target_namespace(), Some("urn:inner"));
        assert_eq!(stack.top().unwrap().element_namespace().as_deref(), Some("urn:inner"));
        assert_eq!(
            stack.resolve("xsd:string"),
            (Some("http://www.w3.org/2001/XMLSchema"), "string")
        );
        assert_eq!(stack.resolve("tns:Thing"), (Some("urn:outer"), "Thing"));

        stack.pop();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.target_namespace(), Some("urn:outer"));
        assert_eq!(stack.resolve("xsd:string").0, None);
    }
}
