//! Per-view request generations.
//!
//! A renderer that reopens a view tags each request with the view's key and a
//! rising generation number. Once a generation has been admitted, any older
//! one for the same key is refused before it does work, so a slow earlier
//! request can never overwrite a newer view.

use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewStamp {
    pub key: String,
    pub generation: u64,
}

impl ViewStamp {
    /// Reads `viewKey` and `generation` from request params. Neither present
    /// means the request is unstamped.
    pub fn from_params(params: &Value) -> Result<Option<Self>, String> {
        let key = params.get("viewKey");
        let generation = params.get("generation");
        match (key, generation) {
            (None, None) => Ok(None),
            (Some(k), Some(g)) => {
                let key = k
                    .as_str()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| "viewKey must be a non-empty string".to_string())?;
                let generation = g
                    .as_u64()
                    .ok_or_else(|| "generation must be a non-negative integer".to_string())?;
                Ok(Some(Self {
                    key: key.to_string(),
                    generation,
                }))
            }
            _ => Err("viewKey and generation must be sent together".to_string()),
        }
    }
}

#[derive(Debug, Default)]
pub struct GenerationTracker {
    latest: HashMap<String, u64>,
}

impl GenerationTracker {
    /// Admits `stamp` unless a newer generation for its view was already
    /// admitted; returns that newer generation on refusal.
    pub fn admit(&mut self, stamp: &ViewStamp) -> Result<(), u64> {
        match self.latest.get(&stamp.key) {
            Some(&latest) if latest > stamp.generation => Err(latest),
            _ => {
                self.latest.insert(stamp.key.clone(), stamp.generation);
                Ok(())
            }
        }
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamp(key: &str, generation: u64) -> ViewStamp {
        ViewStamp {
            key: key.to_string(),
            generation,
        }
    }

    #[test]
    fn older_generations_are_refused_per_view() {
        let mut t = GenerationTracker::default();
        assert_eq!(t.admit(&stamp("timetable", 2)), Ok(()));
        assert_eq!(t.admit(&stamp("timetable", 1)), Err(2));
        assert_eq!(t.admit(&stamp("timetable", 2)), Ok(()));
        assert_eq!(t.admit(&stamp("fees", 1)), Ok(()));
        t.clear();
        assert_eq!(t.admit(&stamp("timetable", 1)), Ok(()));
    }

    #[test]
    fn stamps_need_both_fields() {
        assert_eq!(ViewStamp::from_params(&json!({})), Ok(None));
        assert_eq!(
            ViewStamp::from_params(&json!({ "viewKey": "marks", "generation": 4 })),
            Ok(Some(stamp("marks", 4)))
        );
        assert!(ViewStamp::from_params(&json!({ "viewKey": "marks" })).is_err());
        assert!(ViewStamp::from_params(&json!({ "viewKey": "", "generation": 1 })).is_err());
        assert!(ViewStamp::from_params(&json!({ "viewKey": "m", "generation": -1 })).is_err());
    }
}
