extern crate proc_macro;

use proc_macro::TokenStream;
use std::path::Path;

use lather_codegen as codegen;
use quote::quote_spanned;
use syn::{parse_macro_input, LitStr};

/// Generates a client for the service described at the given path or URL.
///
/// Relative paths are taken from the invoking crate's manifest directory.
#[proc_macro]
pub fn lather(input: TokenStream) -> TokenStream {
    let location = parse_macro_input!(input as LitStr);
    let value = location.value();

    let resolved = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(root) if !value.contains("://") && Path::new(&value).is_relative() => {
            Path::new(&root).join(&value).to_string_lossy().into_owned()
        }
        _ => value,
    };

    match codegen::from_url(&resolved) {
        Ok(tokens) => tokens.into(),
        Err(err) => {
            let message = format!("Cannot generate a client from {}: {}", resolved, chain(&err));
            quote_spanned!(location.span()=> compile_error!(#message);).into()
        }
    }
}

fn chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}
