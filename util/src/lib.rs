//! Runtime half of lather: the type registry built from a service
//! description, the values that live in it, and the SOAP plumbing that moves
//! those values over a [`transport::Transport`].
//!
//! Code emitted by `lather_codegen` depends only on this crate.

pub mod error;
pub mod message;
pub mod ns;
pub mod saved;
pub mod soap;
pub mod transport;
pub mod types;
pub mod value;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use error::Error;
pub use message::{Args, Reply};
pub use soap::{Client, Fault, Method};
pub use types::{Registry, TypeId, TypeRef};
pub use value::{Arg, Instance};
