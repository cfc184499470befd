use std::collections::HashMap;
use std::sync::atomic::{ AtomicUsize, Ordering };

use bytes::Bytes;
use futures::future::try_join_all;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{ debug, info, instrument };
use url::Url;

use super::error::{ LoadError, ParseError };
use super::fetcher::Fetcher;
use super::gltf_loader::{ parse_gltf, validate_buffer, validate_gltf_mesh };
use super::urdf_loader::parse_urdf;
use crate::engine::components::loaded_asset::{ Description, LoadedAsset, Resource, ResourceKind };
use crate::engine::utils::url_utils::{ extension, resolve_reference, resource_base };

/// Reported after each sub-resource finishes loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProgress {
    pub url: Url,
    pub loaded: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Roots for `package://name/...` mesh references.
    pub packages: HashMap<String, Url>,
}

struct PendingResource {
    reference: String,
    url: Url,
    kind: ResourceKind,
    declared_length: Option<usize>,
}

/// Turns a description-document URL into a [`LoadedAsset`].
///
/// The loader keeps no state between calls: the resource base is derived
/// from each document's own URL, so documents from different directories
/// can load at the same time through one loader.
#[derive(Debug, Clone)]
pub struct AssetLoader<F> {
    fetcher: F,
    options: LoaderOptions,
}

impl<F: Fetcher> AssetLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_options(fetcher, LoaderOptions::default())
    }

    pub fn with_options(fetcher: F, options: LoaderOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn with_package(mut self, name: impl Into<String>, root: Url) -> Self {
        self.options.packages.insert(name.into(), root);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Loads the document and every sub-resource it references.
    pub async fn load(&self, url: &Url) -> Result<LoadedAsset, LoadError> {
        self.load_with_progress(url, |_| {}).await
    }

    /// Like [`AssetLoader::load`], calling `on_progress` as sub-resources land.
    ///
    /// Sub-resources are fetched concurrently. The first failure is returned
    /// right away and the fetches still in flight are dropped.
    #[instrument(name = "load_asset", skip_all, fields(url = %url))]
    pub async fn load_with_progress<P>(&self, url: &Url, on_progress: P) -> Result<LoadedAsset, LoadError>
        where P: Fn(LoadProgress) + Sync
    {
        let document = self.fetcher.fetch(url).await?;
        let description = parse_description(url, &document)?;
        let base = resource_base(url);
        let pending = self.pending_resources(&base, &description)?;

        let total = pending.len();
        info!(total, base = %base, "description parsed, loading sub-resources");

        let loaded = AtomicUsize::new(0);
        let resources = try_join_all(
            pending.into_iter().map(|resource| {
                let loaded = &loaded;
                let on_progress = &on_progress;
                async move {
                    let resource = self.load_resource(resource).await?;
                    let count = loaded.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(LoadProgress {
                        url: resource.url.clone(),
                        loaded: count,
                        total,
                    });
                    Ok::<_, LoadError>(resource)
                }
            })
        ).await?;

        info!(resources = resources.len(), "asset loaded");
        Ok(LoadedAsset::new(url.clone(), base, description, resources))
    }

    fn pending_resources(&self, base: &Url, description: &Description) -> Result<Vec<PendingResource>, ParseError> {
        description
            .references()
            .iter()
            .map(|reference| {
                let url = resolve_reference(base, reference, &self.options.packages)?;
                let (kind, declared_length) = match description {
                    Description::Urdf(_) => (ResourceKind::Mesh, None),
                    Description::Gltf(scene) => match scene.buffer_lengths.get(reference) {
                        Some(length) => (ResourceKind::Buffer, Some(*length)),
                        None => (ResourceKind::Image, None),
                    },
                };
                Ok(PendingResource {
                    reference: reference.clone(),
                    url,
                    kind,
                    declared_length,
                })
            })
            .collect()
    }

    async fn load_resource(&self, pending: PendingResource) -> Result<Resource, LoadError> {
        let bytes = self.fetcher.fetch(&pending.url).await?;
        validate_resource(&pending, &bytes)?;
        debug!(url = %pending.url, bytes = bytes.len(), "sub-resource loaded");
        Ok(Resource {
            reference: pending.reference,
            url: pending.url,
            kind: pending.kind,
            bytes,
        })
    }
}

fn parse_description(url: &Url, document: &[u8]) -> Result<Description, ParseError> {
    match extension(url).as_deref() {
        Some("urdf" | "xml") => {
            let xml = std::str::from_utf8(document).map_err(|e| ParseError::Xml {
                url: url.clone(),
                message: e.to_string(),
            })?;
            Ok(Description::Urdf(parse_urdf(url, xml)?))
        }
        Some("gltf" | "glb") => Ok(Description::Gltf(parse_gltf(url, document)?)),
        _ => Err(ParseError::UnsupportedFormat { url: url.clone() }),
    }
}

fn validate_resource(pending: &PendingResource, bytes: &Bytes) -> Result<(), ParseError> {
    let url = &pending.url;
    if bytes.is_empty() {
        return Err(invalid(url, "empty file"));
    }

    match pending.kind {
        ResourceKind::Buffer => {
            if let Some(declared) = pending.declared_length {
                validate_buffer(url, bytes, declared)?;
            }
            Ok(())
        }
        ResourceKind::Image => Ok(()),
        ResourceKind::Mesh => match extension(url).as_deref() {
            Some("gltf" | "glb") => validate_gltf_mesh(url, bytes),
            Some("stl") => validate_stl(url, bytes),
            Some("dae") => validate_xml(url, bytes),
            // obj and friends are passed through for the renderer to decode
            _ => Ok(()),
        },
    }
}

fn validate_stl(url: &Url, bytes: &[u8]) -> Result<(), ParseError> {
    // Binary STL: 80 byte header, u32 triangle count, 50 bytes per triangle
    if bytes.len() >= 84 {
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
        if count.checked_mul(50).and_then(|n| n.checked_add(84)) == Some(bytes.len()) {
            return Ok(());
        }
    }
    if bytes.starts_with(b"solid") {
        return Ok(());
    }
    Err(invalid(url, "neither ASCII nor binary STL"))
}

fn validate_xml(url: &Url, bytes: &[u8]) -> Result<(), ParseError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                return Err(ParseError::Xml {
                    url: url.clone(),
                    message: e.to_string(),
                });
            }
        }
        buf.clear();
    }
}

fn invalid(url: &Url, message: &str) -> ParseError {
    ParseError::InvalidResource {
        url: url.clone(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(url: &str, kind: ResourceKind) -> PendingResource {
        PendingResource {
            reference: url.to_string(),
            url: Url::parse(url).unwrap(),
            kind,
            declared_length: None,
        }
    }

    #[test]
    fn binary_and_ascii_stl_are_accepted() {
        let mut binary = vec![0u8; 84 + 50];
        binary[80] = 1;
        let mesh = pending("https://h/m.stl", ResourceKind::Mesh);
        assert!(validate_resource(&mesh, &Bytes::from(binary)).is_ok());
        assert!(validate_resource(&mesh, &Bytes::from_static(b"solid cube\nendsolid cube\n")).is_ok());
        assert!(matches!(
            validate_resource(&mesh, &Bytes::from_static(b"garbage")),
            Err(ParseError::InvalidResource { .. })
        ));
    }

    #[test]
    fn broken_collada_is_rejected() {
        let mesh = pending("https://h/m.dae", ResourceKind::Mesh);
        assert!(validate_resource(&mesh, &Bytes::from_static(b"<COLLADA></COLLADA>")).is_ok());
        assert!(matches!(
            validate_resource(&mesh, &Bytes::from_static(b"<COLLADA><a></COLLADA>")),
            Err(ParseError::Xml { .. })
        ));
    }

    #[test]
    fn empty_resources_are_rejected() {
        let image = pending("https://h/t.png", ResourceKind::Image);
        assert!(validate_resource(&image, &Bytes::new()).is_err());
    }

    #[test]
    fn unknown_document_format_is_rejected() {
        let url = Url::parse("https://h/model.obj").unwrap();
        assert!(matches!(
            parse_description(&url, b"v 0 0 0"),
            Err(ParseError::UnsupportedFormat { .. })
        ));
    }
}
