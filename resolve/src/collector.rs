use strata_model::{Requirement, RunSpec};

/// The run's top-level requirements in declaration order, without repeats.
pub fn collect_requirements(spec: &RunSpec) -> Vec<Requirement> {
    let mut requirements: Vec<Requirement> = Vec::with_capacity(spec.requires.len());
    for requirement in &spec.requires {
        if !requirements.contains(requirement) {
            requirements.push(requirement.clone());
        }
    }
    requirements
}

#[cfg(test)]
mod tests {
    use strata_model::{Filter, Requirement, RunSpec};

    use super::collect_requirements;

    #[test]
    fn keeps_declaration_order_and_drops_repeats() {
        let spec = RunSpec {
            requires: vec![
                Requirement::identity("b"),
                Requirement::identity("a"),
                Requirement::identity("b"),
                Requirement::new("service", Filter::equal("objectClass", "Log")),
                Requirement::new("service", Filter::equal("objectClass", "Log")).optional(),
            ],
            ..RunSpec::default()
        };

        let collected = collect_requirements(&spec);
        assert_eq!(
            collected,
            [
                Requirement::identity("b"),
                Requirement::identity("a"),
                Requirement::new("service", Filter::equal("objectClass", "Log")),
                Requirement::new("service", Filter::equal("objectClass", "Log")).optional(),
            ]
        );
    }

    #[test]
    fn empty_spec_has_no_requirements() {
        assert!(collect_requirements(&RunSpec::default()).is_empty());
    }
}
