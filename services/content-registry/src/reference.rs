//! Parsing of fully qualified image names
//!
//! Catalog entries are named `repository:tag`, `repository@digest` or
//! `repository:tag@digest`. Names are taken verbatim; no default registry
//! domain or `library/` prefix is added.

use std::fmt;
use std::str::FromStr;

use content_store::{Digest, DigestError};

/// Maximum length of the repository portion of a reference.
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

/// Maximum length of a tag.
pub const TAG_LENGTH_MAX: usize = 128;

/// Error returned when a string is not a valid reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    /// The reference was empty.
    #[error("empty reference")]
    Empty,

    /// The repository name is longer than [`NAME_TOTAL_LENGTH_MAX`].
    #[error("repository name exceeds {NAME_TOTAL_LENGTH_MAX} characters: {0:?}")]
    NameTooLong(String),

    /// The repository name does not follow the naming grammar.
    #[error("invalid repository name {0:?}")]
    InvalidName(String),

    /// The tag does not follow the tag grammar.
    #[error("invalid tag {0:?}")]
    InvalidTag(String),

    /// The digest portion could not be parsed.
    #[error("invalid digest in reference: {0}")]
    InvalidDigest(#[from] DigestError),
}

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A bare repository name, e.g. `docker.io/library/alpine`.
    Repository(String),

    /// A tag within a repository, e.g. `docker.io/library/alpine:3.20`.
    Tagged {
        /// Repository name
        repository: String,
        /// Tag name
        tag: String,
    },

    /// A reference pinned to a digest, optionally carrying a tag as well.
    Digested {
        /// Repository name
        repository: String,
        /// Tag name, for `repository:tag@digest`
        tag: Option<String>,
        /// Pinned digest
        digest: Digest,
    },
}

impl Reference {
    /// Parse a reference string.
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        if s.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (named, digest) = match s.split_once('@') {
            Some((named, digest)) => (named, Some(digest.parse::<Digest>()?)),
            None => (s, None),
        };

        // A tag separator is the last colon not followed by a path separator,
        // so registry ports (`localhost:5000/app`) are left alone.
        let (repository, tag) = match named.rfind(':') {
            Some(idx) if !named[idx..].contains('/') => {
                let tag = &named[idx + 1..];
                if !valid_tag(tag) {
                    return Err(ReferenceError::InvalidTag(tag.to_owned()));
                }
                (&named[..idx], Some(tag.to_owned()))
            }
            _ => (named, None),
        };

        validate_repository(repository)?;
        let repository = repository.to_owned();

        Ok(match (tag, digest) {
            (tag, Some(digest)) => Reference::Digested {
                repository,
                tag,
                digest,
            },
            (Some(tag), None) => Reference::Tagged { repository, tag },
            (None, None) => Reference::Repository(repository),
        })
    }

    /// The repository portion of the reference.
    pub fn repository(&self) -> &str {
        match self {
            Reference::Repository(repository)
            | Reference::Tagged { repository, .. }
            | Reference::Digested { repository, .. } => repository,
        }
    }

    /// The tag, if the reference has one.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Reference::Repository(_) => None,
            Reference::Tagged { tag, .. } => Some(tag),
            Reference::Digested { tag, .. } => tag.as_deref(),
        }
    }

    /// The digest, if the reference is pinned to one.
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Reference::Digested { digest, .. } => Some(digest),
            _ => None,
        }
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reference::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repository())?;
        if let Some(tag) = self.tag() {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = self.digest() {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Check that `name` is a valid repository name.
pub fn validate_repository(name: &str) -> Result<(), ReferenceError> {
    if name.is_empty() {
        return Err(ReferenceError::InvalidName(name.to_owned()));
    }
    if name.len() > NAME_TOTAL_LENGTH_MAX {
        return Err(ReferenceError::NameTooLong(name.to_owned()));
    }

    let mut components = name.split('/').peekable();
    if let Some(first) = components.next() {
        let has_path = components.peek().is_some();
        let is_domain = has_path && (first.contains(['.', ':']) || first == "localhost");
        let valid = if is_domain {
            valid_domain(first)
        } else {
            valid_path_component(first)
        };
        if !valid {
            return Err(ReferenceError::InvalidName(name.to_owned()));
        }
    }

    if components.all(valid_path_component) {
        Ok(())
    } else {
        Err(ReferenceError::InvalidName(name.to_owned()))
    }
}

/// Check that `tag` is a valid tag.
pub fn valid_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    match bytes.split_first() {
        Some((first, rest)) => {
            bytes.len() <= TAG_LENGTH_MAX
                && (first.is_ascii_alphanumeric() || *first == b'_')
                && rest
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        }
        None => false,
    }
}

fn is_lower_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

/// `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`
fn valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let mut idx = 0;
    loop {
        let start = idx;
        while idx < bytes.len() && is_lower_alnum(bytes[idx]) {
            idx += 1;
        }
        if idx == start {
            return false;
        }
        if idx == bytes.len() {
            return true;
        }

        match bytes[idx] {
            b'.' => idx += 1,
            b'_' => {
                idx += 1;
                if bytes.get(idx) == Some(&b'_') {
                    idx += 1;
                }
            }
            b'-' => {
                while bytes.get(idx) == Some(&b'-') {
                    idx += 1;
                }
            }
            _ => return false,
        }
    }
}

/// `host[:port]`, where host is dotted domain components or a bracketed IPv6 address.
fn valid_domain(domain: &str) -> bool {
    let (host, port) = if let Some(rest) = domain.strip_prefix('[') {
        let Some((addr, rest)) = rest.split_once(']') else {
            return false;
        };
        if addr.is_empty() || !addr.bytes().all(|b| b.is_ascii_hexdigit() || b == b':') {
            return false;
        }
        match rest {
            "" => return true,
            rest => match rest.strip_prefix(':') {
                Some(port) => ("", Some(port)),
                None => return false,
            },
        }
    } else {
        match domain.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (domain, None),
        }
    };

    if let Some(port) = port {
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }

    if domain.starts_with('[') {
        return true;
    }

    host.split('.').all(|component| {
        let bytes = component.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                first.is_ascii_alphanumeric()
                    && last.is_ascii_alphanumeric()
                    && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn bare_repository() {
        let reference = Reference::parse("docker.io/library/alpine").unwrap();
        assert_eq!(
            reference,
            Reference::Repository("docker.io/library/alpine".into())
        );
        assert_eq!(reference.tag(), None);
        assert_eq!(reference.digest(), None);
    }

    #[test]
    fn tagged() {
        let reference = Reference::parse("docker.io/library/alpine:3.20").unwrap();
        assert_eq!(reference.repository(), "docker.io/library/alpine");
        assert_eq!(reference.tag(), Some("3.20"));
        assert!(matches!(reference, Reference::Tagged { .. }));
    }

    #[test]
    fn digested() {
        let reference = Reference::parse(&format!("a/b@{DIGEST}")).unwrap();
        assert_eq!(reference.repository(), "a/b");
        assert_eq!(reference.digest().map(Digest::as_str), Some(DIGEST));
        assert_eq!(reference.tag(), None);

        let reference = Reference::parse(&format!("a/b:v1@{DIGEST}")).unwrap();
        assert!(matches!(reference, Reference::Digested { .. }));
        assert_eq!(reference.tag(), Some("v1"));
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let reference = Reference::parse("localhost:5000/app").unwrap();
        assert_eq!(reference, Reference::Repository("localhost:5000/app".into()));

        let reference = Reference::parse("localhost:5000/app:dev").unwrap();
        assert_eq!(reference.repository(), "localhost:5000/app");
        assert_eq!(reference.tag(), Some("dev"));

        let reference = Reference::parse("[::1]:5000/app:dev").unwrap();
        assert_eq!(reference.repository(), "[::1]:5000/app");
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "a/b",
            "a/b:v1",
            "registry.example.com:443/team/app:1.0",
            format!("a/b:v1@{DIGEST}").as_str(),
        ] {
            assert_eq!(Reference::parse(input).unwrap().to_string(), input);
        }
    }

    #[test]
    fn invalid_names() {
        assert_eq!(Reference::parse(""), Err(ReferenceError::Empty));
        assert!(matches!(
            Reference::parse("Upper/case:v1"),
            Err(ReferenceError::InvalidName(_))
        ));
        assert!(matches!(
            Reference::parse("a//b"),
            Err(ReferenceError::InvalidName(_))
        ));
        assert!(matches!(
            Reference::parse("a/b-:v1"),
            Err(ReferenceError::InvalidName(_))
        ));
        assert!(matches!(
            Reference::parse("a/b:"),
            Err(ReferenceError::InvalidTag(_))
        ));
        assert!(matches!(
            Reference::parse("a/b:.hidden"),
            Err(ReferenceError::InvalidTag(_))
        ));
        assert!(matches!(
            Reference::parse("a/b@sha256:short"),
            Err(ReferenceError::InvalidDigest(_))
        ));
        assert!(matches!(
            Reference::parse(&"a".repeat(NAME_TOTAL_LENGTH_MAX + 1)),
            Err(ReferenceError::NameTooLong(_))
        ));
    }

    #[test]
    fn path_component_separators() {
        assert!(valid_path_component("a.b"));
        assert!(valid_path_component("a_b"));
        assert!(valid_path_component("a__b"));
        assert!(valid_path_component("a---b"));
        assert!(!valid_path_component("a___b"));
        assert!(!valid_path_component("a..b"));
        assert!(!valid_path_component("_a"));
    }

    #[test]
    fn tag_grammar() {
        assert!(valid_tag("latest"));
        assert!(valid_tag("_private"));
        assert!(valid_tag("v1.2.3-rc.1"));
        assert!(!valid_tag("-dash"));
        assert!(!valid_tag(&"t".repeat(TAG_LENGTH_MAX + 1)));
        assert!(valid_tag(&"t".repeat(TAG_LENGTH_MAX)));
    }
}
