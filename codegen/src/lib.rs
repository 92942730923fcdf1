//! Emits Rust source that rebuilds a service's registry and methods without
//! reading its description at runtime.
//!
//! Types are declared in dependency order. References that sit on a cycle
//! are emitted as deferred lookups, patched by the registry once every type
//! is declared.

use proc_macro2::TokenStream;
use lather_wsdl::{self as wsdl, Definition};

mod codegen;
mod preprocessor;

pub mod error;
pub mod types;

pub use error::Error;

pub fn from_url<S: AsRef<str>>(url: S) -> Result<TokenStream, Error> {
    let definition = wsdl::parse(url)?;
    from_definition(&definition)
}

pub fn from_definition(definition: &Definition) -> Result<TokenStream, Error> {
    let definition = preprocessor::preprocess(definition)?;
    Ok(codegen::codegen(&definition))
}

/// The emission order of `definition`'s types.
pub fn declarations(definition: &Definition) -> Result<types::Definition, Error> {
    preprocessor::preprocess(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        format!("{}/../wsdl/tests/support/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn compact(tokens: &TokenStream) -> String {
        tokens.to_string().replace(' ', "")
    }

    #[test]
    fn generated_code_parses() {
        for name in ["lyrics.wsdl", "accounts.wsdl", "zoo.wsdl", "tokens.wsdl", "codes.wsdl"] {
            let tokens = from_url(fixture(name)).unwrap();
            syn::parse2::<syn::File>(tokens).unwrap();
        }
    }

    #[test]
    fn operations_become_methods() {
        let tokens = compact(&from_url(fixture("lyrics.wsdl")).unwrap());

        assert!(tokens.contains("pubfncheck_song_exists(&self,args:::lather_util::Args)"));
        assert!(tokens.contains(r#"self.inner.call("checkSongExists",args)"#));
        assert!(tokens.contains(r#"Part::new("artist",TypeRef::Resolved(registry.require("string")?))"#));
        assert!(tokens.contains("Style::Rpc"));
    }

    #[test]
    fn recursive_types_are_deferred() {
        let definition = wsdl::parse(fixture("zoo.wsdl")).unwrap();
        let ordered = declarations(&definition).unwrap();

        let position = |name: &str| {
            ordered
                .declarations
                .iter()
                .position(|declaration| declaration.descriptor.name.name == name)
                .unwrap()
        };
        assert!(position("Animal") < position("Dog"));
        assert!(position("Dog") < position("dog"));

        let enclosure = &ordered.declarations[position("Enclosure")];
        let next = definition.registry.require("Enclosure").unwrap();
        assert!(enclosure.deferred.contains(&next));

        let tokens = compact(&from_definition(&definition).unwrap());
        assert!(tokens.contains(r#"TypeRef::deferred("Enclosure")"#));
    }

    #[test]
    fn every_type_is_declared_once() {
        let definition = wsdl::parse(fixture("accounts.wsdl")).unwrap();
        let ordered = declarations(&definition).unwrap();

        let mut names: Vec<_> = ordered
            .declarations
            .iter()
            .map(|declaration| declaration.descriptor.name.name.clone())
            .collect();
        let declared = names.len();
        names.sort();
        names.dedup();

        assert_eq!(names.len(), declared);
        assert_eq!(declared + ordered.builtins.len(), definition.registry.len());
    }
}
