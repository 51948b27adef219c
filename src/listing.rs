use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{EntityKind, EntityRecord};

/// Selection sentinel meaning "do not filter on this facet".
pub const FACET_ALL: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FacetSelection {
    All,
    Value(String),
}

impl FacetSelection {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(FACET_ALL) {
            FacetSelection::All
        } else {
            FacetSelection::Value(raw.to_string())
        }
    }
}

impl From<String> for FacetSelection {
    fn from(raw: String) -> Self {
        FacetSelection::parse(&raw)
    }
}

impl From<FacetSelection> for String {
    fn from(sel: FacetSelection) -> Self {
        match sel {
            FacetSelection::All => FACET_ALL.to_string(),
            FacetSelection::Value(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub text_query: String,
    /// Facet field name (e.g. `center_id`) -> selection.
    #[serde(default)]
    pub facets: BTreeMap<String, FacetSelection>,
}

/// A fetched collection plus the view the current criteria leave visible.
#[derive(Debug, Clone)]
pub struct ListSurface {
    kind: EntityKind,
    all: Vec<EntityRecord>,
    criteria: FilterCriteria,
    filtered: Vec<usize>,
}

impl ListSurface {
    pub fn new(kind: EntityKind, rows: Vec<EntityRecord>) -> Self {
        let mut surface = Self {
            kind,
            all: rows,
            criteria: FilterCriteria::default(),
            filtered: Vec::new(),
        };
        surface.recompute();
        surface
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn total(&self) -> usize {
        self.all.len()
    }

    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
        self.recompute();
    }

    /// Replaces the collection after a refresh; the criteria stay.
    pub fn replace_rows(&mut self, rows: Vec<EntityRecord>) {
        self.all = rows;
        self.recompute();
    }

    pub fn filtered(&self) -> Vec<&EntityRecord> {
        self.filtered.iter().map(|i| &self.all[*i]).collect()
    }

    fn recompute(&mut self) {
        let query = self.criteria.text_query.trim().to_lowercase();
        self.filtered = self
            .all
            .iter()
            .enumerate()
            .filter(|(_, rec)| text_matches(self.kind, rec, &query))
            .filter(|(_, rec)| {
                self.criteria
                    .facets
                    .iter()
                    .all(|(field, sel)| facet_matches(rec, field, sel))
            })
            .map(|(i, _)| i)
            .collect();
    }
}

fn text_matches(kind: EntityKind, rec: &EntityRecord, query: &str) -> bool {
    query.is_empty() || kind.display_name(rec).to_lowercase().contains(query)
}

/// Numeric facets compare as parsed integers, everything else as trimmed text.
fn facet_matches(rec: &EntityRecord, field: &str, selection: &FacetSelection) -> bool {
    let FacetSelection::Value(wanted) = selection else {
        return true;
    };
    let Some(value) = rec.get(field) else {
        return false;
    };
    match (wanted.parse::<i64>().ok(), value.as_i64()) {
        (Some(w), Some(v)) => w == v,
        (Some(_), None) => false,
        _ => value.display().trim() == wanted.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    impl FilterCriteria {
        fn with_text(mut self, query: &str) -> Self {
            self.text_query = query.to_string();
            self
        }

        fn with_facet(mut self, field: &str, selection: &str) -> Self {
            self.facets
                .insert(field.to_string(), FacetSelection::parse(selection));
            self
        }
    }

    fn employees() -> Vec<EntityRecord> {
        let names = [
            ("Anita Sharma", 1),
            ("Ravi Kumar", 2),
            ("Anil Menon", 1),
            ("Priya Nair", 3),
            ("Kavita Rao", 2),
            ("Suresh Babu", 1),
            ("Deepa Pillai", 3),
            ("Manish Anand", 2),
            ("Lakshmi Iyer", 1),
            ("Farhan Ali", 3),
        ];
        names
            .iter()
            .map(|(name, center)| {
                EntityRecord::from_json(json!({ "name": name, "center_id": center })).expect("record")
            })
            .collect()
    }

    #[test]
    fn empty_query_returns_everything() {
        let mut list = ListSurface::new(EntityKind::Employee, employees());
        assert_eq!(list.filtered().len(), 10);
        list.set_criteria(FilterCriteria::default().with_text("").with_facet("center_id", "all"));
        assert_eq!(list.filtered().len(), 10);
    }

    #[test]
    fn text_query_is_case_insensitive_substring() {
        let mut list = ListSurface::new(EntityKind::Employee, employees());
        list.set_criteria(FilterCriteria::default().with_text("AN"));
        for rec in list.filtered() {
            assert!(rec.text("name").to_lowercase().contains("an"));
        }
        list.set_criteria(FilterCriteria::default().with_text("ani"));
        let names: Vec<String> = list.filtered().iter().map(|r| r.text("name")).collect();
        assert_eq!(names, vec!["Anita Sharma", "Anil Menon", "Manish Anand"]);
    }

    #[test]
    fn payroll_lines_match_on_employee_and_period() {
        let rows: Vec<EntityRecord> = [(11, "March 2025"), (12, "March 2025"), (11, "April 2025")]
            .iter()
            .map(|(employee, period)| {
                EntityRecord::from_json(json!({ "employee_id": employee, "pay_period": period, "salary": 42000.0 }))
                    .expect("record")
            })
            .collect();
        let mut list = ListSurface::new(EntityKind::Payroll, rows);
        list.set_criteria(FilterCriteria::default().with_text("march"));
        assert_eq!(list.filtered().len(), 2);
        list.set_criteria(FilterCriteria::default().with_text("11"));
        let periods: Vec<String> = list.filtered().iter().map(|r| r.text("pay_period")).collect();
        assert_eq!(periods, vec!["March 2025", "April 2025"]);
    }

    #[test]
    fn numeric_facet_compares_as_integers() {
        let mut list = ListSurface::new(EntityKind::Employee, employees());
        list.set_criteria(FilterCriteria::default().with_facet("center_id", "01"));
        assert_eq!(list.filtered().len(), 4);
        list.set_criteria(
            FilterCriteria::default()
                .with_text("a")
                .with_facet("center_id", "3"),
        );
        let names: Vec<String> = list.filtered().iter().map(|r| r.text("name")).collect();
        assert_eq!(names, vec!["Priya Nair", "Deepa Pillai", "Farhan Ali"]);
    }

    #[test]
    fn no_match_is_an_empty_view_not_an_error() {
        let mut list = ListSurface::new(EntityKind::Employee, employees());
        list.set_criteria(FilterCriteria::default().with_text("zzz"));
        assert!(list.filtered().is_empty());
        list.replace_rows(Vec::new());
        assert!(list.filtered().is_empty());
        assert_eq!(list.total(), 0);
    }

    #[test]
    fn students_search_on_full_name() {
        let rows = vec![
            EntityRecord::from_json(json!({ "first_name": "Arjun", "last_name": "Das", "program_id": 4 }))
                .expect("record"),
            EntityRecord::from_json(json!({ "first_name": "Mira", "last_name": "Sen", "program_id": 5 }))
                .expect("record"),
        ];
        let mut list = ListSurface::new(EntityKind::Student, rows);
        list.set_criteria(FilterCriteria::default().with_text("jun d"));
        assert_eq!(list.filtered().len(), 1);
        list.set_criteria(FilterCriteria::default().with_facet("program_id", "5"));
        assert_eq!(list.filtered()[0].text("first_name"), "Mira");
    }
}
