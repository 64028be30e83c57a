use std::{collections::BTreeMap, fmt, sync::Arc};

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, filter::Filter};

/// Namespace of the capability every component offers for its own identity.
pub const IDENTITY_NAMESPACE: &str = "strata.identity";

pub type Attributes = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId {
    pub name: Arc<str>,
    pub version: Version,
}

impl ComponentId {
    pub fn new(name: impl Into<Arc<str>>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};version={}", self.name, self.version)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capability {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl Capability {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: Attributes::new(),
            version: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    fn identity(id: &ComponentId) -> Self {
        Capability::new(IDENTITY_NAMESPACE)
            .with_attribute("name", id.name.as_ref())
            .with_version(id.version.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Requirement {
    pub namespace: String,
    pub filter: Filter,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl Requirement {
    pub fn new(namespace: impl Into<String>, filter: Filter) -> Self {
        Self {
            namespace: namespace.into(),
            filter,
            optional: false,
        }
    }

    /// Requirement on a component's identity capability by name.
    pub fn identity(name: &str) -> Self {
        Self::new(IDENTITY_NAMESPACE, Filter::equal("name", name))
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn matches(&self, capability: &Capability) -> bool {
        self.namespace == capability.namespace && self.filter.matches(capability)
    }

    /// The first capability of `component` this requirement matches, if any.
    pub fn provided_by<'a>(&self, component: &'a Component) -> Option<&'a Capability> {
        component.capabilities().iter().find(|cap| self.matches(cap))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};filter:='{}'", self.namespace, self.filter)?;
        if self.optional {
            f.write_str(";resolution:=optional")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RequirementObject {
            namespace: String,
            #[serde(default = "Filter::match_all")]
            filter: Filter,
            #[serde(default)]
            optional: bool,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RequirementForm {
            Name(String),
            Object(RequirementObject),
        }

        match RequirementForm::deserialize(deserializer)? {
            RequirementForm::Name(name) => Ok(Requirement::identity(&name)),
            RequirementForm::Object(obj) => Ok(Requirement {
                namespace: obj.namespace,
                filter: obj.filter,
                optional: obj.optional,
            }),
        }
    }
}

/// Serialized form of a component, as it appears in repository indexes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawComponent {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl RawComponent {
    pub fn validate(self) -> Result<Component, Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidComponent {
                name: self.name,
                message: "name must be non-empty".to_string(),
            });
        }
        if let Some(cap) = self
            .capabilities
            .iter()
            .find(|cap| cap.namespace == IDENTITY_NAMESPACE)
        {
            return Err(Error::InvalidComponent {
                name: self.name.clone(),
                message: format!("capability namespace `{}` is reserved", cap.namespace),
            });
        }

        let id = ComponentId::new(self.name, self.version);
        let mut capabilities = Vec::with_capacity(self.capabilities.len() + 1);
        capabilities.push(Capability::identity(&id));
        capabilities.extend(self.capabilities);

        Ok(Component {
            id,
            capabilities,
            requirements: self.requirements,
        })
    }
}

/// A resolvable unit. The identity capability is always at index 0 of `capabilities()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RawComponent", try_from = "RawComponent")]
pub struct Component {
    id: ComponentId,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
}

impl Component {
    pub fn builder(name: impl Into<String>, version: Version) -> RawComponent {
        RawComponent {
            name: name.into(),
            version,
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn version(&self) -> &Version {
        &self.id.version
    }

    /// All capabilities including the identity capability.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Capabilities as declared, without the identity capability.
    pub fn declared_capabilities(&self) -> &[Capability] {
        &self.capabilities[1..]
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl RawComponent {
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }
}

impl TryFrom<RawComponent> for Component {
    type Error = Error;

    fn try_from(raw: RawComponent) -> Result<Self, Self::Error> {
        raw.validate()
    }
}

impl From<Component> for RawComponent {
    fn from(component: Component) -> Self {
        let Component {
            id,
            mut capabilities,
            requirements,
        } = component;
        capabilities.remove(0);
        RawComponent {
            name: id.name.to_string(),
            version: id.version,
            capabilities,
            requirements,
        }
    }
}
