use std::fmt;

use strata_model::LeveledBundle;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// The persisted bundles already match.
    Unchanged,
    /// The persisted bundles were replaced with the calculated ones.
    Changed,
    /// The bundles differ and fail-on-changes left the persisted ones alone.
    Drift(DriftReport),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriftReport {
    pub existing: Option<Vec<LeveledBundle>>,
    pub calculated: Vec<LeveledBundle>,
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fail on changes set to true and the calculated run bundles differ from the existing \
             ones"
        )?;
        f.write_str("Existing runbundles   : ")?;
        match &self.existing {
            Some(existing) => write_bundles(f, existing)?,
            None => f.write_str("<none>")?,
        }
        f.write_str("\nCalculated runbundles : ")?;
        write_bundles(f, &self.calculated)
    }
}

fn write_bundles(f: &mut fmt::Formatter<'_>, bundles: &[LeveledBundle]) -> fmt::Result {
    f.write_str("[")?;
    for (idx, bundle) in bundles.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{bundle}")?;
    }
    f.write_str("]")
}

/// Compare freshly calculated bundles against the persisted ones and update them unless
/// `fail_on_changes` forbids it.
pub fn reconcile(
    calculated: &[LeveledBundle],
    persisted: &mut Option<Vec<LeveledBundle>>,
    fail_on_changes: bool,
) -> Reconciliation {
    if persisted.as_deref() == Some(calculated) {
        return Reconciliation::Unchanged;
    }
    if fail_on_changes {
        return Reconciliation::Drift(DriftReport {
            existing: persisted.clone(),
            calculated: calculated.to_vec(),
        });
    }
    *persisted = Some(calculated.to_vec());
    Reconciliation::Changed
}
