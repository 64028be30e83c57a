use std::{collections::BTreeMap, fmt, str::FromStr};

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{ComponentId, Error, RepositoryRef, Requirement};

/// Attribute key carrying the assigned start level of a run bundle.
pub const STARTLEVEL_ATTRIBUTE: &str = "startlevel";

/// The effective input of one resolution.
///
/// Every field contributes to the resolution fingerprint, so any change here produces a fresh
/// cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSpec {
    /// Top-level run requirements, in declaration order.
    #[serde(default)]
    pub requires: Vec<Requirement>,
    #[serde(default)]
    pub repositories: Vec<RepositoryRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_levels: Option<StartLevelConfig>,
    /// Remaining effective properties (framework, execution environment, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StartLevelOrder {
    #[default]
    LeastDependenciesFirst,
    LeastDependenciesLast,
    /// Whatever order the solver presented.
    Random,
}

impl StartLevelOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            StartLevelOrder::LeastDependenciesFirst => "leastdependenciesfirst",
            StartLevelOrder::LeastDependenciesLast => "leastdependencieslast",
            StartLevelOrder::Random => "random",
        }
    }
}

impl fmt::Display for StartLevelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartLevelOrder {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "leastdependenciesfirst" => Ok(StartLevelOrder::LeastDependenciesFirst),
            "leastdependencieslast" => Ok(StartLevelOrder::LeastDependenciesLast),
            "random" => Ok(StartLevelOrder::Random),
            _ => Err(Error::InvalidStartLevels {
                input: input.to_string(),
                message: "unknown order".to_string(),
            }),
        }
    }
}

/// Start level assignment: the i-th ordered component gets `begin + i * step`.
///
/// Written as a clause string, e.g. `order=leastdependencieslast,begin=10,step=1`; omitted keys
/// take their defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
pub struct StartLevelConfig {
    pub order: StartLevelOrder,
    pub begin: i64,
    pub step: i64,
}

impl StartLevelConfig {
    pub const DEFAULT_BEGIN: i64 = 100;
    pub const DEFAULT_STEP: i64 = 10;

    pub fn new(order: StartLevelOrder, begin: i64, step: i64) -> Self {
        Self { order, begin, step }
    }

    pub fn level_at(&self, index: usize) -> i64 {
        let index = i64::try_from(index).unwrap_or(i64::MAX);
        self.begin.saturating_add(index.saturating_mul(self.step))
    }
}

impl Default for StartLevelConfig {
    fn default() -> Self {
        Self {
            order: StartLevelOrder::default(),
            begin: Self::DEFAULT_BEGIN,
            step: Self::DEFAULT_STEP,
        }
    }
}

impl FromStr for StartLevelConfig {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| Error::InvalidStartLevels {
            input: input.to_string(),
            message,
        };

        let mut config = StartLevelConfig::default();
        for clause in input.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let Some((key, value)) = clause.split_once('=') else {
                return Err(invalid(format!("expected `key=value`, found `{clause}`")));
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "order" => {
                    config.order = value
                        .parse()
                        .map_err(|_| invalid(format!("unknown order `{value}`")))?;
                }
                "begin" => {
                    config.begin = value
                        .parse()
                        .map_err(|_| invalid(format!("`begin` is not an integer: `{value}`")))?;
                }
                "step" => {
                    config.step = value
                        .parse()
                        .map_err(|_| invalid(format!("`step` is not an integer: `{value}`")))?;
                }
                other => return Err(invalid(format!("unknown key `{other}`"))),
            }
        }
        Ok(config)
    }
}

impl fmt::Display for StartLevelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order={},begin={},step={}",
            self.order, self.begin, self.step
        )
    }
}

/// One entry of the computed run bundle list.
///
/// `attributes` holds [`STARTLEVEL_ATTRIBUTE`] only when start levels were configured.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeveledBundle {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl LeveledBundle {
    pub fn new(id: &ComponentId) -> Self {
        Self {
            name: id.name.to_string(),
            version: id.version.clone(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.attributes
            .insert(STARTLEVEL_ATTRIBUTE.to_string(), level.to_string());
        self
    }

    pub fn level(&self) -> Option<i64> {
        self.attributes
            .get(STARTLEVEL_ATTRIBUTE)
            .and_then(|level| level.parse().ok())
    }

    pub fn id(&self) -> ComponentId {
        ComponentId::new(self.name.as_str(), self.version.clone())
    }
}

impl fmt::Display for LeveledBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};version='[{},{}]'", self.name, self.version, self.version)?;
        for (key, value) in &self.attributes {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}
