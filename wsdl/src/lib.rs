//! Reads WSDL and XSD documents into a [`Definition`]: a type registry and
//! the SOAP methods that use it.

use std::{path::Path, sync::Arc};
use url::Url;

use lather_util::{soap::Client, transport::HttpTransport};

mod parser;

pub mod error;
pub mod loader;
pub mod schema;
pub mod types;

pub use loader::{Fetch, Loader, Source, UrlFetcher};
pub use types::{Definition, Factory};

/// Accepts either a URL or a path to a local file.
pub fn url<S: AsRef<str>>(location: S) -> Result<Url, error::Error> {
    match Url::parse(location.as_ref()) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::from_file_path(
            &Path::new(location.as_ref())
                .canonicalize()
                .map_err(|err| error::Error::PathConversionError(Some(err)))?,
        )
        .map_err(|_| error::Error::PathConversionError(None)),
        Err(err) => Err(err.into()),
    }
}

pub fn parse<S: AsRef<str>>(location: S) -> Result<Arc<Definition>, error::Error> {
    parse_with(location, UrlFetcher::new())
}

/// Like [`parse`], fetching every document through `fetcher`.
pub fn parse_with<S: AsRef<str>, F: Fetch>(location: S, fetcher: F) -> Result<Arc<Definition>, error::Error> {
    Loader::with_fetcher(fetcher).factory(&url(location)?)?.build()
}

/// A dynamic client for the service at `location`, talking HTTP.
pub fn client<S: AsRef<str>>(location: S) -> Result<Client<HttpTransport>, error::Error> {
    Ok(parse(location)?.client(HttpTransport::new()))
}
