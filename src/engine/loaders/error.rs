//! Errors produced while fetching and interpreting description documents.

use thiserror::Error;
use url::Url;

/// Network or filesystem failure while fetching a document or sub-resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("failed to fetch {url}: HTTP {status}")]
    Status {
        url: Url,
        status: u16,
    },

    /// The request never produced a response.
    #[error("failed to fetch {url}: {message}")]
    Transport {
        url: Url,
        message: String,
    },

    #[error("failed to read {url}: {source}")]
    Io {
        url: Url,
        #[source]
        source: std::io::Error,
    },

    #[error("nothing registered for {url}")]
    NotFound {
        url: Url,
    },

    #[error("unsupported URL scheme for {url}")]
    UnsupportedScheme {
        url: Url,
    },
}

impl FetchError {
    pub fn url(&self) -> &Url {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Io { url, .. }
            | FetchError::NotFound { url }
            | FetchError::UnsupportedScheme { url } => url,
        }
    }
}

/// A document or sub-resource could not be interpreted.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error in {url}: {message}")]
    Xml {
        url: Url,
        message: String,
    },

    #[error("glTF parse error in {url}: {message}")]
    Gltf {
        url: Url,
        message: String,
    },

    #[error("JSON parse error in {url}: {source}")]
    Json {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required attribute: {attribute} on {element}")]
    MissingAttribute {
        attribute: &'static str,
        element: String,
    },

    #[error("missing required element: {element} in {context}")]
    MissingElement {
        element: &'static str,
        context: String,
    },

    #[error("unsupported description format: {url}")]
    UnsupportedFormat {
        url: Url,
    },

    #[error("package {package} is not registered (in {reference})")]
    UnresolvedPackage {
        package: String,
        reference: String,
    },

    #[error("invalid reference {reference:?}: {message}")]
    InvalidReference {
        reference: String,
        message: String,
    },

    #[error("invalid resource {url}: {message}")]
    InvalidResource {
        url: Url,
        message: String,
    },
}

/// First failure of an asset load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
