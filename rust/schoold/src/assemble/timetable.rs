use super::rows::SlotRow;
use super::scope::TeacherScope;
use super::{distinct, NameLookup, Notices};
use crate::config::{canonical_day, SchoolConfig};
use crate::error::AssembleError;
use crate::group::{build_matrix, Matrix};
use crate::normalize::{normalize, ClassKey};
use crate::store::{fetch, DataStore, Filter, Select};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimetableCell {
    pub subject_id: String,
    pub subject_name: String,
    pub class_label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableView {
    pub days: Vec<String>,
    pub periods: Vec<u32>,
    /// Day rows by period columns; `null` cells mean no class.
    pub matrix: Matrix<String, u32, Option<TimetableCell>>,
    pub notices: Notices,
}

struct PlacedSlot {
    day: String,
    period: u32,
    subject_id: String,
    class: ClassKey,
}

fn place(slots: Vec<SlotRow>, mut keep: impl FnMut(&SlotRow, &ClassKey) -> bool) -> Vec<PlacedSlot> {
    let mut out = Vec::with_capacity(slots.len());
    for s in slots {
        let class = match normalize(&s.class_name, s.section.as_deref()) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(error = %e, "skipping timetable slot");
                continue;
            }
        };
        if !keep(&s, &class) {
            continue;
        }
        // Unknown day names fall outside the matrix and are counted there.
        let day = canonical_day(&s.day).unwrap_or(s.day);
        out.push(PlacedSlot {
            day,
            period: s.period,
            subject_id: s.subject_id,
            class,
        });
    }
    out
}

fn into_view(store: &dyn DataStore, cfg: &SchoolConfig, placed: Vec<PlacedSlot>) -> TimetableView {
    let mut notices = Notices::default();
    let subjects = NameLookup::subjects(
        store,
        &distinct(placed.iter().map(|p| p.subject_id.as_str())),
        &mut notices,
    );
    let periods = cfg.periods();
    let triples: Vec<(String, u32, Option<TimetableCell>)> = placed
        .into_iter()
        .map(|p| {
            let cell = TimetableCell {
                subject_name: subjects.name(&p.subject_id, &mut notices),
                subject_id: p.subject_id,
                class_label: p.class.canonical(),
            };
            (p.day, p.period, Some(cell))
        })
        .collect();
    let matrix = build_matrix(&cfg.days, &periods, triples, None);
    if matrix.collisions > 0 {
        tracing::warn!(collisions = matrix.collisions, "timetable slots share a cell");
    }
    TimetableView {
        days: cfg.days.clone(),
        periods,
        matrix,
        notices,
    }
}

/// Day-by-period grid for one class. Slots stored without a section apply to
/// every section of the grade.
pub fn class_timetable(
    store: &dyn DataStore,
    cfg: &SchoolConfig,
    class: &ClassKey,
) -> Result<TimetableView, AssembleError> {
    let slots: Vec<SlotRow> = fetch(store, Select::from("timetable_slots"))
        .map_err(AssembleError::fetch("timetable_slots"))?;
    let placed = place(slots, |_, k| k.covers(class));
    Ok(into_view(store, cfg, placed))
}

/// A teacher's grid, restricted to subjects (and classes) they are assigned.
pub fn teacher_timetable(
    store: &dyn DataStore,
    cfg: &SchoolConfig,
    teacher: &TeacherScope,
) -> Result<TimetableView, AssembleError> {
    let subject_ids = distinct(teacher.assignments.iter().map(|a| a.subject_id.as_str()));
    let slots: Vec<SlotRow> = fetch(
        store,
        Select::from("timetable_slots").filter(Filter::any_of("subject_id", &subject_ids)),
    )
    .map_err(AssembleError::fetch("timetable_slots"))?;
    let teacher_id = teacher.teacher.id.as_str();
    let placed = place(slots, |s, k| {
        s.teacher_id.as_deref().map_or(true, |t| t == teacher_id) && teacher.shares_row(&s.subject_id, k)
    });
    Ok(into_view(store, cfg, placed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::scope::resolve_teacher;
    use crate::assemble::testing::{exec, mem_db, session};
    use crate::session::Role;
    use crate::store::SqliteStore;

    fn seed(conn: &rusqlite::Connection) {
        exec(
            conn,
            "INSERT INTO subjects(id, name) VALUES('math', 'Mathematics'), ('sci', 'Science'),
                                                  ('art', 'Art');
             INSERT INTO teachers(id, full_name) VALUES('t1', 'Mr. Iyer');
             INSERT INTO teacher_subjects(id, teacher_id, subject_id, class_name, section)
               VALUES('ts1', 't1', 'math', NULL, NULL);
             INSERT INTO timetable_slots(id, day, period, subject_id, teacher_id, class_name, section)
               VALUES('a', 'Mon', 1, 'math', 't1', '10th', 'A'),
                     ('b', 'monday', 1, 'art', NULL, '10-A', NULL),
                     ('c', 'Tue', 2, 'sci', NULL, '10', NULL),
                     ('d', 'Wed', 3, 'math', 't1', '9', 'B'),
                     ('e', 'Thu', 4, 'ghost', NULL, '10', 'A'),
                     ('f', 'Fri', 1, 'math', 't1', 'KG', 'A'),
                     ('g', 'Sun', 1, 'math', 't1', '10', 'A');",
        );
    }

    #[test]
    fn class_grid_is_total_with_explicit_empty_cells() {
        let conn = mem_db();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let cfg = SchoolConfig::default();
        let view = class_timetable(&store, &cfg, &ClassKey::new(10, Some("A"))).expect("view");

        assert_eq!(view.matrix.rows.len(), cfg.days.len());
        for row in &view.matrix.rows {
            assert_eq!(row.cells.len(), cfg.periods_per_day as usize);
        }
        let mon1 = view.matrix.get(&"Mon".to_string(), &1).expect("cell").clone();
        assert_eq!(mon1.map(|c| c.subject_name), Some("Mathematics".to_string()));
        assert_eq!(view.matrix.collisions, 1);
        // Class-level slot applies to section A.
        assert!(view.matrix.get(&"Tue".to_string(), &2).expect("cell").is_some());
        assert!(view.matrix.get(&"Wed".to_string(), &3).expect("cell").is_none());
        let ghost = view.matrix.get(&"Thu".to_string(), &4).expect("cell").clone().expect("slot");
        assert_eq!(ghost.subject_name, "Unknown subject");
        assert_eq!(view.notices.items().len(), 1);
        // Sunday is outside the configured days.
        assert_eq!(view.matrix.out_of_range, 1);
    }

    #[test]
    fn teacher_grid_only_holds_assigned_subjects() {
        let conn = mem_db();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let cfg = SchoolConfig::default();
        let teacher = resolve_teacher(&store, &session(Role::Teacher, None, Some("t1")), None)
            .expect("teacher");
        let view = teacher_timetable(&store, &cfg, &teacher).expect("view");

        let cells: Vec<&TimetableCell> = view
            .matrix
            .rows
            .iter()
            .flat_map(|r| r.cells.iter().filter_map(|c| c.value.as_ref()))
            .collect();
        assert!(cells.iter().all(|c| c.subject_id == "math"));
        let wed = view.matrix.get(&"Wed".to_string(), &3).expect("cell").clone().expect("slot");
        assert_eq!(wed.class_label, "9-B");
        assert_eq!(cells.len(), 2);
    }
}
