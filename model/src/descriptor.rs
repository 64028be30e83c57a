use std::{io::Write as _, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, LeveledBundle, RunSpec};

/// A run descriptor document: the run spec plus the run bundles last committed for it.
///
/// ```json5
/// {
///   spec: {
///     requires: ["org.example.app"],
///     repositories: ["index.json5"],
///     start_levels: "order=leastdependenciesfirst,begin=100,step=10",
///   },
///   run_bundles: [{ name: "org.example.api", version: "1.0.0", attributes: { startlevel: "100" } }],
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunDescriptor {
    pub spec: RunSpec,
    /// `None` until the first successful resolve has been committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_bundles: Option<Vec<LeveledBundle>>,
}

impl RunDescriptor {
    pub fn new(spec: RunSpec) -> Self {
        Self {
            spec,
            run_bundles: None,
        }
    }

    pub fn parse(source: &str) -> Result<Self, Error> {
        Ok(json5::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    /// Writes the descriptor as pretty JSON (a JSON5 subset) through a temp file in the same
    /// directory, persisted over `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".strata-run")
            .tempfile_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use semver::Version;

    use super::*;
    use crate::{ComponentId, Requirement};

    #[test]
    fn writes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.run.json5");

        let mut descriptor = RunDescriptor::new(RunSpec {
            requires: vec![Requirement::identity("app")],
            ..RunSpec::default()
        });
        descriptor.run_bundles = Some(vec![
            LeveledBundle::new(&ComponentId::new("app", Version::new(1, 0, 0))).with_level(100),
        ]);
        descriptor.write_to(&path).unwrap();

        let back = RunDescriptor::load(&path).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn write_back_leaves_no_temp_files_and_keeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let json5 = dir.path().join("app.run.json5");
        let json = dir.path().join("app.run.json");

        let first = RunDescriptor::new(RunSpec {
            requires: vec![Requirement::identity("first")],
            ..RunSpec::default()
        });
        let second = RunDescriptor::new(RunSpec {
            requires: vec![Requirement::identity("second")],
            ..RunSpec::default()
        });
        first.write_to(&json5).unwrap();
        second.write_to(&json).unwrap();
        first.write_to(&json5).unwrap();

        assert_eq!(RunDescriptor::load(&json5).unwrap(), first);
        assert_eq!(RunDescriptor::load(&json).unwrap(), second);
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["app.run.json", "app.run.json5"]);
    }

    #[test]
    fn failed_write_back_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone").join("app.run.json5");

        let descriptor = RunDescriptor::new(RunSpec::default());
        assert!(matches!(descriptor.write_to(&missing), Err(Error::Io(_))));
        assert!(!missing.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_run_bundles_stays_absent() {
        let descriptor = RunDescriptor::parse(r#"{ spec: { requires: ["app"] } }"#).unwrap();
        assert_eq!(descriptor.run_bundles, None);
        let empty = RunDescriptor::parse(r#"{ spec: {}, run_bundles: [] }"#).unwrap();
        assert_eq!(empty.run_bundles, Some(vec![]));
    }
}
