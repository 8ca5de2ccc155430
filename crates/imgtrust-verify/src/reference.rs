//! Artifact reference parsing.
//!
//! Supports the usual container reference forms:
//! - `host/repo` → `latest` tag
//! - `host/repo:tag`
//! - `host/repo@sha256:abc...`
//! - `host/repo:tag@sha256:abc...` → digest wins for lookups
//!
//! A first path component without a `.` or `:` (and not `localhost`) is part
//! of the repository, and the registry defaults to Docker Hub.

use std::fmt;
use std::str::FromStr;

use crate::digest::ContentDigest;

/// Registry used when the reference names none.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Tag used when the reference names neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Invalid artifact reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid artifact reference {reference:?}: {reason}")]
pub struct ReferenceError {
    pub reference: String,
    pub reason: String,
}

/// A parsed artifact reference. Used only as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactReference {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<ContentDigest>,
}

impl ArtifactReference {
    /// Parse a reference string.
    ///
    /// # Examples
    ///
    /// ```
    /// use imgtrust_verify::ArtifactReference;
    ///
    /// let reference = ArtifactReference::parse("ghcr.io/acme/app:v1").unwrap();
    /// assert_eq!(reference.registry(), "ghcr.io");
    /// assert_eq!(reference.repository(), "acme/app");
    /// assert_eq!(reference.tag(), Some("v1"));
    ///
    /// let short = ArtifactReference::parse("busybox").unwrap();
    /// assert_eq!(short.registry(), "index.docker.io");
    /// assert_eq!(short.repository(), "library/busybox");
    /// assert_eq!(short.tag(), Some("latest"));
    /// ```
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let original = reference;
        let reference = reference.trim();
        let fail = |reason: &str| ReferenceError {
            reference: original.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(fail("empty reference"));
        }
        if reference.contains("://") {
            return Err(fail("reference must not include a URL scheme"));
        }

        let (name_and_tag, digest) = match reference.split_once('@') {
            Some((rest, digest)) => {
                let digest = ContentDigest::parse(digest).map_err(|e| fail(&e.to_string()))?;
                (rest, Some(digest))
            }
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones are ports.
        let last_slash = name_and_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_and_tag[last_slash..].find(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&name_and_tag[..split], Some(&name_and_tag[split + 1..]))
            }
            None => (name_and_tag, None),
        };

        if let Some(tag) = tag {
            validate_tag(tag).map_err(|reason| fail(reason))?;
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first.to_string(), rest.to_string()),
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        validate_repository(&repository).map_err(|reason| fail(reason))?;

        let tag = match (tag, &digest) {
            (Some(tag), _) => Some(tag.to_string()),
            (None, Some(_)) => None,
            (None, None) => Some(DEFAULT_TAG.to_string()),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&ContentDigest> {
        self.digest.as_ref()
    }

    /// Whether the reference pins a digest.
    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }

    /// Manifest reference for registry lookups: the digest if pinned, else the tag.
    pub fn manifest_reference(&self) -> String {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => digest.to_string(),
            (None, Some(tag)) => tag.clone(),
            (None, None) => DEFAULT_TAG.to_string(),
        }
    }

    /// Copy of this reference pinned to `digest`.
    pub fn with_digest(&self, digest: ContentDigest) -> Self {
        Self {
            digest: Some(digest),
            ..self.clone()
        }
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ArtifactReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_tag(tag: &str) -> Result<(), &'static str> {
    if tag.is_empty() {
        return Err("tag cannot be empty");
    }
    if tag.len() > 128 {
        return Err("tag cannot exceed 128 characters");
    }
    let first_ok = tag
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '_')
        .unwrap_or(false);
    if !first_ok {
        return Err("tag must start with a letter, digit, or underscore");
    }
    if !tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err("tag may only contain letters, digits, '_', '.', and '-'");
    }
    Ok(())
}

fn validate_repository(repository: &str) -> Result<(), &'static str> {
    if repository.is_empty() {
        return Err("repository cannot be empty");
    }
    for component in repository.split('/') {
        if component.is_empty() {
            return Err("repository path components cannot be empty");
        }
        if !component.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
        }) {
            return Err("repository may only contain lowercase letters, digits, '.', '_', and '-'");
        }
        let edge_ok = |c: Option<char>| c.map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
        if !edge_ok(component.chars().next()) || !edge_ok(component.chars().last()) {
            return Err("repository components must start and end with a letter or digit");
        }
    }
    Ok(())
}
