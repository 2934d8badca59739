use super::rows::FeeRow;
use crate::error::AssembleError;
use crate::normalize::{grade_label_variants, ClassKey};
use crate::store::{fetch, DataStore, Filter, Select};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLine {
    pub id: String,
    pub fee_type: String,
    pub amount: f64,
    pub stored_class: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeView {
    pub grade: u32,
    pub lines: Vec<FeeLine>,
    pub total: f64,
    /// Rows were found under more than one spelling of the grade. They are
    /// all summed; the flag lets the caller surface possible double entry.
    pub mixed_forms: bool,
}

/// Fee lines for a grade stored under either `"10"` or `"10th"`.
pub fn class_fees(store: &dyn DataStore, class: &ClassKey) -> Result<FeeView, AssembleError> {
    let variants = grade_label_variants(class.grade);
    let rows: Vec<FeeRow> = fetch(
        store,
        Select::from("fees")
            .filter(Filter::any_of("class_name", &variants))
            .order_by("fee_type"),
    )
    .map_err(AssembleError::fetch("fees"))?;

    let forms: BTreeSet<&str> = rows.iter().map(|r| r.class_name.as_str()).collect();
    let mixed_forms = forms.len() > 1;
    if mixed_forms {
        tracing::warn!(grade = class.grade, "fee rows stored under several class spellings");
    }
    let total: f64 = rows.iter().map(|r| r.amount).sum();
    let lines = rows
        .into_iter()
        .map(|r| FeeLine {
            id: r.id,
            fee_type: r.fee_type,
            amount: r.amount,
            stored_class: r.class_name,
        })
        .collect();

    Ok(FeeView {
        grade: class.grade,
        lines,
        total,
        mixed_forms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::testing::{exec, mem_db};
    use crate::store::SqliteStore;

    #[test]
    fn either_spelling_matches_and_both_are_summed() {
        let conn = mem_db();
        exec(
            &conn,
            "INSERT INTO fees(id, class_name, fee_type, amount)
               VALUES('f1', '10th', 'Tuition', 1200.0),
                     ('f2', '10', 'Lab', 300.0),
                     ('f3', '9th', 'Tuition', 1000.0),
                     ('f4', '10-A', 'Bus', 50.0);",
        );
        let store = SqliteStore::new(&conn);
        let view = class_fees(&store, &ClassKey::new(10, Some("A"))).expect("fees");
        assert_eq!(view.lines.len(), 2);
        assert_eq!(view.total, 1500.0);
        assert!(view.mixed_forms);
    }

    #[test]
    fn single_form_is_not_flagged() {
        let conn = mem_db();
        exec(
            &conn,
            "INSERT INTO fees(id, class_name, fee_type, amount) VALUES('f1', '10', 'Tuition', 900.0);",
        );
        let store = SqliteStore::new(&conn);
        let view = class_fees(&store, &ClassKey::new(10, None)).expect("fees");
        assert_eq!(view.total, 900.0);
        assert!(!view.mixed_forms);

        let none = class_fees(&store, &ClassKey::new(4, None)).expect("fees");
        assert!(none.lines.is_empty());
        assert_eq!(none.total, 0.0);
    }
}
