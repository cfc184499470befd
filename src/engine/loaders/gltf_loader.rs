use url::Url;

use super::error::ParseError;
use crate::engine::components::loaded_asset::GltfDescription;

fn gltf_error(url: &Url, error: gltf::Error) -> ParseError {
    ParseError::Gltf {
        url: url.clone(),
        message: error.to_string(),
    }
}

/// Reads a glTF document and lists the external files it needs.
///
/// Embedded `data:` URIs and GLB binary chunks are not external references.
pub fn parse_gltf(source: &Url, data: &[u8]) -> Result<GltfDescription, ParseError> {
    let gltf = gltf::Gltf::from_slice(data).map_err(|e| gltf_error(source, e))?;

    let mut description = GltfDescription {
        node_names: gltf.nodes()
            .map(|node| node.name().map_or_else(|| format!("node_{}", node.index()), str::to_string))
            .collect(),
        mesh_count: gltf.meshes().count(),
        animation_count: gltf.animations().count(),
        ..GltfDescription::default()
    };

    for buffer in gltf.buffers() {
        if let gltf::buffer::Source::Uri(uri) = buffer.source() {
            if is_external(uri) {
                description.buffer_lengths.insert(uri.to_string(), buffer.length());
                push_unique(&mut description.references, uri);
            }
        }
    }

    for image in gltf.images() {
        if let gltf::image::Source::Uri { uri, .. } = image.source() {
            if is_external(uri) {
                push_unique(&mut description.references, uri);
            }
        }
    }

    Ok(description)
}

/// Checks that a fetched mesh file is a readable glTF/GLB document.
pub fn validate_gltf_mesh(url: &Url, data: &[u8]) -> Result<(), ParseError> {
    gltf::Gltf::from_slice(data).map(|_| ()).map_err(|e| gltf_error(url, e))
}

/// Checks that a fetched buffer holds at least the bytes the document declared.
pub fn validate_buffer(url: &Url, data: &[u8], declared: usize) -> Result<(), ParseError> {
    if data.len() < declared {
        return Err(ParseError::InvalidResource {
            url: url.clone(),
            message: format!("buffer has {} bytes, document declares {declared}", data.len()),
        });
    }
    Ok(())
}

fn is_external(uri: &str) -> bool {
    !uri.starts_with("data:")
}

fn push_unique(references: &mut Vec<String>, uri: &str) {
    if !references.iter().any(|r| r == uri) {
        references.push(uri.to_string());
    }
}
