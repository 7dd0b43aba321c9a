use shared::domain::{Catalog, FlowSummary};

/// Case-insensitive substring match over the title or the space-joined tags.
/// A blank term keeps the whole catalog in its original order.
pub fn filter_catalog<'a>(catalog: &'a Catalog, term: &str) -> Vec<&'a FlowSummary> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return catalog.flows().iter().collect();
    }

    catalog
        .flows()
        .iter()
        .filter(|flow| {
            flow.title.to_lowercase().contains(&needle)
                || flow.tags.join(" ").to_lowercase().contains(&needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::FlowId;

    fn catalog() -> Catalog {
        Catalog(vec![
            FlowSummary {
                id: FlowId::from("a"),
                title: "Create User".into(),
                tags: vec!["users".into(), "onboarding".into()],
            },
            FlowSummary {
                id: FlowId::from("b"),
                title: "Rotate Keys".into(),
                tags: vec!["security".into()],
            },
            FlowSummary {
                id: FlowId::from("c"),
                title: "Offboard Contractor".into(),
                tags: vec!["users".into()],
            },
        ])
    }

    fn ids(flows: Vec<&FlowSummary>) -> Vec<&str> {
        flows.into_iter().map(|flow| flow.id.as_str()).collect()
    }

    #[test]
    fn blank_term_returns_everything_in_order() {
        let catalog = catalog();
        assert_eq!(ids(filter_catalog(&catalog, "")), vec!["a", "b", "c"]);
        assert_eq!(ids(filter_catalog(&catalog, "   ")), vec!["a", "b", "c"]);
    }

    #[test]
    fn matches_title_or_tags_ignoring_case() {
        let catalog = catalog();
        assert_eq!(ids(filter_catalog(&catalog, "ROTATE")), vec!["b"]);
        assert_eq!(ids(filter_catalog(&catalog, "users")), vec!["a", "c"]);
        assert_eq!(ids(filter_catalog(&catalog, "users onboarding")), vec!["a"]);
    }

    #[test]
    fn unmatched_term_yields_nothing() {
        assert!(filter_catalog(&catalog(), "payroll").is_empty());
    }
}
