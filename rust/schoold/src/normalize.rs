//! Class/section label reconciliation.
//!
//! Tables in a school workspace are filled in by different people and carry
//! different conventions for the same class: `"10th"`, `"10"`, `"Grade 10"`,
//! `"10-A"`. Every comparison between class labels goes through [`normalize`]
//! so the rules live in one place.

use crate::error::AssembleError;
use serde::Serialize;
use std::fmt;

const SECTION_SEPARATOR: char = '-';

/// Canonical `(grade, section)` join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassKey {
    pub grade: u32,
    pub section: Option<String>,
}

impl ClassKey {
    #[cfg(test)]
    pub fn new(grade: u32, section: Option<&str>) -> Self {
        Self {
            grade,
            section: section.and_then(clean_section),
        }
    }

    /// `"10"` or `"10-A"`. Feeding this back into [`normalize`] yields `self`.
    pub fn canonical(&self) -> String {
        match &self.section {
            Some(s) => format!("{}{}{}", self.grade, SECTION_SEPARATOR, s),
            None => self.grade.to_string(),
        }
    }

    /// Class-level keys (no section) cover every section of the grade.
    pub fn covers(&self, other: &ClassKey) -> bool {
        if self.grade != other.grade {
            return false;
        }
        match (&self.section, &other.section) {
            (None, _) => true,
            (Some(a), Some(b)) => a == b,
            (Some(_), None) => false,
        }
    }

    /// True when either key covers the other. Used where one side is a
    /// class-level row and the other a sectioned scope, in either order.
    pub fn overlaps(&self, other: &ClassKey) -> bool {
        self.covers(other) || other.covers(self)
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn clean_section(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_uppercase())
    }
}

fn parse_grade(label: &str, raw_class: &str) -> Result<u32, AssembleError> {
    let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(AssembleError::UnresolvedIdentity {
            label: raw_class.to_string(),
            reason: "class label has no grade digits".to_string(),
        });
    }
    digits
        .parse::<u32>()
        .map_err(|_| AssembleError::UnresolvedIdentity {
            label: raw_class.to_string(),
            reason: "grade out of range".to_string(),
        })
}

/// Resolve a raw class label and optional separate section into a [`ClassKey`].
///
/// When the label has embedded sections (`"10-A"`, `"10-B-A"`), the last
/// segment wins. An embedded section that disagrees with the separate one, or
/// a separate section that itself contains the separator, is ambiguous and
/// reported as unresolved.
pub fn normalize(raw_class: &str, raw_section: Option<&str>) -> Result<ClassKey, AssembleError> {
    let label = raw_class.trim();
    let (grade_part, embedded) = match label.rsplit_once(SECTION_SEPARATOR) {
        Some((head, tail)) => (head, clean_section(tail)),
        None => (label, None),
    };
    let grade = parse_grade(grade_part, raw_class)?;
    if let Some(s) = raw_section.filter(|s| s.contains(SECTION_SEPARATOR)) {
        // "10" + "a-b" would render as "10-A-B" and read back as section B.
        return Err(AssembleError::UnresolvedIdentity {
            label: raw_class.to_string(),
            reason: format!("section {} contains '{}'", s.trim(), SECTION_SEPARATOR),
        });
    }
    let separate = raw_section.and_then(clean_section);

    let section = match (embedded, separate) {
        (Some(e), Some(s)) if e != s => {
            return Err(AssembleError::UnresolvedIdentity {
                label: raw_class.to_string(),
                reason: format!("embedded section {e} disagrees with section {s}"),
            });
        }
        (Some(e), _) => Some(e),
        (None, s) => s,
    };

    Ok(ClassKey { grade, section })
}

pub fn ordinal_suffix(n: u32) -> &'static str {
    if (11..=13).contains(&(n % 100)) {
        return "th";
    }
    match n % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// The stored spellings of a grade that exact-match lookups must accept,
/// e.g. `["10", "10th"]`.
pub fn grade_label_variants(grade: u32) -> Vec<String> {
    vec![grade.to_string(), format!("{}{}", grade, ordinal_suffix(grade))]
}
