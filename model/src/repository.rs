use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::{Component, Error, Fingerprint};

/// A repository referenced from a run spec: a location (absolute URL or a path relative to the
/// run descriptor) and an optional sha256 checksum of the index bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RepositoryRef {
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl RepositoryRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            checksum: None,
        }
    }

    /// Resolve `location` against `base` (absolute locations ignore the base).
    pub fn url(&self, base: &Url) -> Result<Url, Error> {
        base.join(&self.location)
            .map_err(|source| Error::InvalidRepositoryLocation {
                location: self.location.clone(),
                source,
            })
    }
}

impl<'de> Deserialize<'de> for RepositoryRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RepositoryObject {
            location: String,
            #[serde(default)]
            checksum: Option<String>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RepositoryForm {
            Location(String),
            Object(RepositoryObject),
        }

        match RepositoryForm::deserialize(deserializer)? {
            RepositoryForm::Location(location) => Ok(RepositoryRef::new(location)),
            RepositoryForm::Object(obj) => Ok(RepositoryRef {
                location: obj.location,
                checksum: obj.checksum,
            }),
        }
    }
}

/// On-disk shape of a repository index document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// A loaded repository. Its identity is its URL plus the digest of the index bytes.
#[derive(Clone, Debug)]
pub struct Repository {
    url: Url,
    digest: Fingerprint,
    name: Option<String>,
    components: Arc<[Arc<Component>]>,
}

impl Repository {
    pub fn new(url: Url, index: RepositoryIndex, digest: Fingerprint) -> Self {
        Self {
            url,
            digest,
            name: index.name,
            components: index.components.into_iter().map(Arc::new).collect(),
        }
    }

    /// Parse a JSON5 index document fetched from `url`.
    pub fn parse(url: Url, source: &str) -> Result<Self, Error> {
        let index: RepositoryIndex = json5::from_str(source)?;
        let digest = Fingerprint::of_bytes(source.as_bytes());
        Ok(Self::new(url, index, digest))
    }

    /// Build an in-memory repository; the digest covers the serialized components.
    pub fn from_components<I>(url: Url, components: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Component>,
    {
        let index = RepositoryIndex {
            name: None,
            components: components.into_iter().collect(),
        };
        let digest = Fingerprint::of(&index)?;
        Ok(Self::new(url, index, digest))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn digest(&self) -> Fingerprint {
        self.digest
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn components(&self) -> &[Arc<Component>] {
        &self.components
    }
}

#[cfg(test)]
mod tests {
    use semver::Version;
    use url::Url;

    use super::*;

    #[test]
    fn parses_index_and_digests_bytes() {
        let url = Url::parse("file:///repo/index.json5").unwrap();
        let source = r#"{
            name: "local",
            components: [
                {
                    name: "a",
                    version: "1.0.0",
                    requirements: [{ namespace: "service", filter: "(objectClass=B)" }],
                },
                {
                    name: "b",
                    version: "2.0.0",
                    capabilities: [{ namespace: "service", attributes: { objectClass: "B" } }],
                },
            ],
        }"#;

        let repo = Repository::parse(url.clone(), source).unwrap();
        assert_eq!(repo.url(), &url);
        assert_eq!(repo.name(), Some("local"));
        assert_eq!(repo.components().len(), 2);
        assert_eq!(repo.components()[1].version(), &Version::new(2, 0, 0));
        assert_eq!(repo.digest(), Fingerprint::of_bytes(source.as_bytes()));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let url = Url::parse("file:///repo/index.json5").unwrap();
        let err = Repository::parse(url, r#"{ bundles: [] }"#).unwrap_err();
        assert!(matches!(err, Error::Json5(_)));
    }

    #[test]
    fn location_resolves_against_base() {
        let base = Url::parse("file:///work/app.run.json5").unwrap();
        assert_eq!(
            RepositoryRef::new("repos/index.json5").url(&base).unwrap(),
            Url::parse("file:///work/repos/index.json5").unwrap()
        );
        assert_eq!(
            RepositoryRef::new("https://example.com/i.json5")
                .url(&base)
                .unwrap()
                .as_str(),
            "https://example.com/i.json5"
        );
    }
}
