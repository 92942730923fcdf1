//! Fetching a service description and every document it imports.

use std::collections::{HashSet, VecDeque};

use roxmltree::{Document, Node};
use url::Url;

use lather_util::ns;

use crate::{error::Error, types::Factory};

/// The text of one fetched document.
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub url: Url,
    pub text: String,
}

/// Where documents come from.
pub trait Fetch {
    fn fetch(&self, url: &Url) -> Result<String, Error>;
}

impl<F> Fetch for F
where
    F: Fn(&Url) -> Result<String, Error>,
{
    fn fetch(&self, url: &Url) -> Result<String, Error> {
        self(url)
    }
}

/// Reads `file:` URLs from disk and `http(s):` URLs with a blocking reqwest client.
#[derive(Clone, Debug, Default)]
pub struct UrlFetcher {
    client: reqwest::blocking::Client,
}

impl UrlFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Fetch for UrlFetcher {
    fn fetch(&self, url: &Url) -> Result<String, Error> {
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::PathConversionError(None))?;
                std::fs::read_to_string(path).map_err(Error::FileOpenError)
            }
            "http" | "https" => Ok(self
                .client
                .get(url.as_str())
                .send()?
                .error_for_status()?
                .text()?),
            scheme => Err(Error::UnsupportedScheme(scheme.to_owned())),
        }
    }
}

/// Loads a root document and, breadth first, everything it imports.
#[derive(Clone, Debug, Default)]
pub struct Loader<F = UrlFetcher> {
    fetcher: F,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: Fetch> Loader<F> {
    pub fn with_fetcher(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Every document reachable from `root`, root first. Each URL is fetched
    /// once, so circular imports terminate.
    pub fn load(&self, root: &Url) -> Result<Vec<Source>, Error> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        let mut sources = Vec::new();

        seen.insert(root.clone());
        queue.push_back(root.clone());

        while let Some(url) = queue.pop_front() {
            log::debug!("Loading {}", url);
            let text = self.fetcher.fetch(&url)?;

            let document = Document::parse(&text)?;
            for location in imports(&document) {
                let mut import = url.join(location)?;
                import.set_fragment(None);

                if seen.insert(import.clone()) {
                    queue.push_back(import);
                } else {
                    log::debug!("Skipping {}, already loaded", import);
                }
            }

            sources.push(Source { url, text });
        }

        Ok(sources)
    }

    pub fn factory(&self, root: &Url) -> Result<Factory, Error> {
        Ok(Factory::new(self.load(root)?))
    }
}

fn is_import(node: &Node) -> bool {
    let name = node.tag_name();
    matches!(name.name(), "import" | "include")
        && matches!(name.namespace(), Some(ns::XSD) | Some(ns::WSDL))
}

/// Locations named by `import`/`include` elements, schema or WSDL.
pub fn imports<'a>(document: &'a Document) -> impl Iterator<Item = &'a str> + 'a {
    document
        .descendants()
        .filter(is_import)
        .filter_map(|node| node.attribute("schemaLocation").or_else(|| node.attribute("location")))
}
