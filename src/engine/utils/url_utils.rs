use std::collections::HashMap;

use url::Url;

use crate::engine::loaders::ParseError;

/// Removes the leading forward slash from a relative path if it exists.
pub fn remove_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Converts an application-relative path into an absolute URL under `base`.
///
/// `base` is treated as a directory even when it lacks a trailing slash, so
/// `https://host/site` + `/data/x.json` gives `https://host/site/data/x.json`.
pub fn absolute_url(base: &Url, relative: &str) -> Result<Url, url::ParseError> {
    directory_url(base).join(remove_leading_slash(relative))
}

/// Directory component of `url`: the final path segment is stripped.
///
/// This is the base every relative sub-resource reference of a description
/// document is resolved against.
pub fn resource_base(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    if let Ok(mut segments) = base.path_segments_mut() {
        segments.pop();
        segments.push("");
    }
    base
}

fn directory_url(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut dir = url.clone();
    let path = format!("{}/", url.path());
    dir.set_path(&path);
    dir
}

/// Resolves a reference found inside a description document.
///
/// Absolute URLs are kept, `package://name/path` goes through `packages`,
/// everything else is joined onto `base`.
pub fn resolve_reference(
    base: &Url,
    reference: &str,
    packages: &HashMap<String, Url>
) -> Result<Url, ParseError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ParseError::InvalidReference {
            reference: reference.to_string(),
            message: "empty reference".to_string(),
        });
    }

    if let Some(rest) = reference.strip_prefix("package://") {
        let (package, path) = rest.split_once('/').unwrap_or((rest, ""));
        let root = packages.get(package).ok_or_else(|| ParseError::UnresolvedPackage {
            package: package.to_string(),
            reference: reference.to_string(),
        })?;
        return directory_url(root).join(path).map_err(|e| ParseError::InvalidReference {
            reference: reference.to_string(),
            message: e.to_string(),
        });
    }

    // Windows-style separators show up in exported URDFs
    let normalized = reference.replace('\\', "/");
    base.join(&normalized).map_err(|e| ParseError::InvalidReference {
        reference: reference.to_string(),
        message: e.to_string(),
    })
}

/// Lower-cased extension of the last path segment, if any.
pub fn extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (_, ext) = segment.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}
