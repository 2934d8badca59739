//! Cross-entity assemblies: each one resolves a scope, fetches the related
//! tables, joins them in memory and returns a plain view model.

pub mod attendance;
pub mod exams;
pub mod fees;
pub mod homework;
pub mod marks;
pub mod rows;
pub mod scope;
pub mod timetable;

use crate::error::AssembleError;
use crate::store::{fetch, DataStore, Filter, Select};
use rows::{SubjectRow, TeacherRow};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub code: &'static str,
    pub message: String,
}

/// Recoverable problems collected during an assembly.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct Notices {
    items: Vec<Notice>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl Notices {
    pub fn push(&mut self, e: &AssembleError) {
        let message = e.to_string();
        if self.seen.insert(message.clone()) {
            self.items.push(Notice {
                code: e.code(),
                message,
            });
        }
    }

    #[cfg(test)]
    pub fn items(&self) -> &[Notice] {
        &self.items
    }
}

/// Id to display-name map for a referenced table. Unknown ids resolve to a
/// placeholder and leave a notice instead of failing the assembly.
#[derive(Debug, Clone)]
pub struct NameLookup {
    kind: &'static str,
    placeholder: &'static str,
    names: HashMap<String, String>,
    codes: HashMap<String, String>,
}

impl NameLookup {
    fn empty(kind: &'static str, placeholder: &'static str) -> Self {
        Self {
            kind,
            placeholder,
            names: HashMap::new(),
            codes: HashMap::new(),
        }
    }

    /// Loads subject names for `ids`. A failed fetch is recorded in `notices`
    /// and every subject renders as the placeholder.
    pub fn subjects(store: &dyn DataStore, ids: &[&str], notices: &mut Notices) -> Self {
        let mut out = Self::empty("subject", "Unknown subject");
        if ids.is_empty() {
            return out;
        }
        let q = Select::from("subjects").filter(Filter::any_of("id", ids));
        match fetch::<SubjectRow>(store, q) {
            Ok(rows) => {
                for s in rows {
                    if let Some(code) = s.code {
                        out.codes.insert(s.id.clone(), code);
                    }
                    out.names.insert(s.id, s.name);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "subject lookup failed");
                notices.push(&AssembleError::FetchFailed {
                    table: "subjects",
                    source: e,
                });
            }
        }
        out
    }

    pub fn teachers(store: &dyn DataStore, ids: &[&str], notices: &mut Notices) -> Self {
        let mut out = Self::empty("teacher", "Unknown teacher");
        if ids.is_empty() {
            return out;
        }
        let q = Select::from("teachers").filter(Filter::any_of("id", ids));
        match fetch::<TeacherRow>(store, q) {
            Ok(rows) => {
                out.names = rows.into_iter().map(|t| (t.id, t.full_name)).collect();
            }
            Err(e) => {
                tracing::error!(error = %e, "teacher lookup failed");
                notices.push(&AssembleError::FetchFailed {
                    table: "teachers",
                    source: e,
                });
            }
        }
        out
    }

    pub fn name(&self, id: &str, notices: &mut Notices) -> String {
        match self.names.get(id) {
            Some(n) => n.clone(),
            None => {
                notices.push(&AssembleError::UnmatchedForeignKey {
                    kind: self.kind,
                    id: id.to_string(),
                });
                self.placeholder.to_string()
            }
        }
    }

    pub fn code(&self, id: &str) -> Option<String> {
        self.codes.get(id).cloned()
    }
}

/// Distinct ids in first-appearance order.
pub(crate) fn distinct<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
