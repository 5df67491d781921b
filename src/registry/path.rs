//! Parsers for the slash-delimited paths a Docker registry emits.

use super::InvalidRegistryPathError;
use crate::digest::{Digest, SHA256};
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathType {
    Repositories,
    Blobs,
    Manifests,
    Uploads,
    Layers,
    Invalid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathSubType {
    Revisions,
    Tags,
    Data,
    Link,
    StartedAt,
    HashStates,
    Invalid,
}

type Result<T> = std::result::Result<T, InvalidRegistryPathError>;

fn invalid(path_type: PathType, path: &str) -> InvalidRegistryPathError {
    InvalidRegistryPathError {
        path_type,
        path: path.to_owned(),
    }
}

static CLASSIFIERS: Lazy<Vec<(Regex, PathType, PathSubType)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"^.*/_manifests/revisions/.*$").unwrap(),
            PathType::Manifests,
            PathSubType::Revisions,
        ),
        (
            Regex::new(r"^.*/_manifests/tags/.*$").unwrap(),
            PathType::Manifests,
            PathSubType::Tags,
        ),
        (
            Regex::new(r"^.*/_layers/sha256/[0-9a-f]+/link$").unwrap(),
            PathType::Layers,
            PathSubType::Link,
        ),
        (
            Regex::new(r"^.*/_layers/sha256/[0-9a-f]+/data$").unwrap(),
            PathType::Layers,
            PathSubType::Data,
        ),
        (
            Regex::new(r"^.*/_uploads/[^/]+/data$").unwrap(),
            PathType::Uploads,
            PathSubType::Data,
        ),
        (
            Regex::new(r"^.*/_uploads/[^/]+/startedat$").unwrap(),
            PathType::Uploads,
            PathSubType::StartedAt,
        ),
        (
            Regex::new(r"^.*/_uploads/[^/]+/hashstates(/.*)?$").unwrap(),
            PathType::Uploads,
            PathSubType::HashStates,
        ),
        (
            Regex::new(r"^.*/blobs/sha256/[0-9a-f]{2}/[0-9a-f]+/data$").unwrap(),
            PathType::Blobs,
            PathSubType::Data,
        ),
    ]
});

/// Classify a registry path. First match wins; anything the registry
/// would not emit is invalid.
pub fn parse_path(path: &str) -> Result<(PathType, PathSubType)> {
    CLASSIFIERS
        .iter()
        .find(|(pattern, _, _)| pattern.is_match(path))
        .map(|&(_, path_type, subtype)| (path_type, subtype))
        .ok_or_else(|| invalid(PathType::Invalid, path))
}

static REPO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*/repositories/(?P<repo>.+)/(_manifests|_layers|_uploads)(/.*)?$").unwrap()
});

/// The repository name, which may itself contain slashes.
pub fn get_repo(path: &str) -> Result<String> {
    REPO_RE
        .captures(path)
        .map(|caps| caps["repo"].to_owned())
        .ok_or_else(|| invalid(PathType::Repositories, path))
}

static BLOB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*/blobs/sha256/(?P<shard>[0-9a-f]{2})/(?P<digest>[0-9a-f]{64})/data$").unwrap()
});

/// The digest of a blob data path. The shard directory must agree with
/// the first digest byte.
pub fn get_blob_digest(path: &str) -> Result<Digest> {
    let caps = BLOB_RE.captures(path).ok_or_else(|| invalid(PathType::Blobs, path))?;
    let digest = &caps["digest"];
    if caps["shard"] != digest[..2] {
        return Err(invalid(PathType::Blobs, path));
    }
    Digest::new(SHA256, digest).map_err(|_| invalid(PathType::Blobs, path))
}

static LAYER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*/_layers/sha256/(?P<digest>[0-9a-f]{64})/(link|data)$").unwrap()
});

pub fn get_layer_digest(path: &str) -> Result<Digest> {
    let caps = LAYER_RE
        .captures(path)
        .ok_or_else(|| invalid(PathType::Layers, path))?;
    Digest::new(SHA256, &caps["digest"]).map_err(|_| invalid(PathType::Layers, path))
}

static MANIFEST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^.*/_manifests/(revisions|tags/[^/]+/index)/sha256/(?P<digest>[0-9a-f]{64})/link$",
    )
    .unwrap()
});

pub fn get_manifest_digest(path: &str) -> Result<Digest> {
    let caps = MANIFEST_RE
        .captures(path)
        .ok_or_else(|| invalid(PathType::Manifests, path))?;
    Digest::new(SHA256, &caps["digest"]).map_err(|_| invalid(PathType::Manifests, path))
}

static MANIFEST_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^.*/_manifests/tags/(?P<tag>[^/]+)/(?P<kind>current|index/sha256/[0-9a-f]{64})/link$",
    )
    .unwrap()
});

/// The tag a manifest link refers to, and whether it is the `current`
/// pointer rather than a pinned index entry.
pub fn get_manifest_tag(path: &str) -> Result<(String, bool)> {
    let caps = MANIFEST_TAG_RE
        .captures(path)
        .ok_or_else(|| invalid(PathType::Manifests, path))?;
    Ok((caps["tag"].to_owned(), &caps["kind"] == "current"))
}

static UPLOAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*/_uploads/(?P<uuid>[^/]+)/(data|startedat|hashstates/\w+(/\w+)?)$").unwrap()
});

pub fn get_upload_uuid(path: &str) -> Result<String> {
    UPLOAD_RE
        .captures(path)
        .map(|caps| caps["uuid"].to_owned())
        .ok_or_else(|| invalid(PathType::Uploads, path))
}

static UPLOAD_HASH_STATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*/_uploads/[^/]+/hashstates/(?P<algo>\w+)/(?P<offset>\d+)$").unwrap()
});

pub fn get_upload_algo_and_offset(path: &str) -> Result<(String, u64)> {
    let caps = UPLOAD_HASH_STATE_RE
        .captures(path)
        .ok_or_else(|| invalid(PathType::Uploads, path))?;
    let offset = caps["offset"]
        .parse()
        .map_err(|_| invalid(PathType::Uploads, path))?;
    Ok((caps["algo"].to_owned(), offset))
}
