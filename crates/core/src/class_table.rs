//! Insertion-ordered class store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::ContextError;

/// A defined class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub ns: String,
    pub name: String,
    pub is_soft: bool,
    pub tags: BTreeSet<String>,
}

impl Class {
    pub fn is_hard(&self) -> bool {
        !self.is_soft
    }
}

/// Store of classes keyed by `(namespace, name)`.
///
/// Entries iterate in the order they were first defined. Redefining a
/// class replaces it in place.
#[derive(Debug, Default, Clone)]
pub struct ClassTable {
    entries: BTreeMap<u64, Class>,
    index: HashMap<(String, String), u64>,
    next_seq: u64,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a class.
    ///
    /// Fails if a soft class would replace an existing hard one. A hard
    /// class may replace a soft one.
    pub fn put<I, S>(&mut self, ns: &str, name: &str, is_soft: bool, tags: I) -> Result<(), ContextError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = (ns.to_string(), name.to_string());
        let class = Class {
            ns: key.0.clone(),
            name: key.1.clone(),
            is_soft,
            tags: tags.into_iter().map(Into::into).collect(),
        };

        if let Some(existing) = self.index.get(&key).and_then(|seq| self.entries.get_mut(seq)) {
            if existing.is_hard() && is_soft {
                return Err(ContextError::HardClassConflict {
                    class: name.to_string(),
                });
            }
            *existing = class;
            return Ok(());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(seq, class);
        self.index.insert(key, seq);
        Ok(())
    }

    pub fn get(&self, ns: &str, name: &str) -> Option<&Class> {
        let seq = self.index.get(&(ns.to_string(), name.to_string()))?;
        self.entries.get(seq)
    }

    pub fn contains(&self, ns: &str, name: &str) -> bool {
        self.get(ns, name).is_some()
    }

    /// Remove a class. Returns false if it was not present.
    pub fn remove(&mut self, ns: &str, name: &str) -> bool {
        match self.index.remove(&(ns.to_string(), name.to_string())) {
            Some(seq) => self.entries.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Remove every class. Returns false if the table was already empty.
    pub fn clear(&mut self) -> bool {
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        self.index.clear();
        had_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All classes in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Class> {
        self.entries.values()
    }

    /// Classes in `ns` (any namespace if `None`), restricted to hard and/or
    /// soft entries.
    pub fn iter_filtered<'a>(
        &'a self,
        ns: Option<&'a str>,
        hard: bool,
        soft: bool,
    ) -> impl Iterator<Item = &'a Class> + 'a {
        self.entries.values().filter(move |c| {
            ns.map_or(true, |ns| c.ns == ns) && ((c.is_soft && soft) || (!c.is_soft && hard))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_tags() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn put_get_remove() {
        let mut t = ClassTable::new();
        t.put("default", "web", true, no_tags()).unwrap();
        assert!(t.contains("default", "web"));
        assert!(!t.contains("other", "web"));
        assert!(t.remove("default", "web"));
        assert!(!t.remove("default", "web"));
        assert!(t.is_empty());
    }

    #[test]
    fn soft_over_hard_is_rejected() {
        let mut t = ClassTable::new();
        t.put("default", "linux", false, no_tags()).unwrap();
        let err = t.put("default", "linux", true, no_tags()).unwrap_err();
        assert_eq!(
            err,
            ContextError::HardClassConflict {
                class: "linux".into()
            }
        );
        assert!(t.get("default", "linux").unwrap().is_hard());
    }

    #[test]
    fn hard_over_soft_is_allowed() {
        let mut t = ClassTable::new();
        t.put("default", "x", true, no_tags()).unwrap();
        t.put("default", "x", false, ["source=agent"]).unwrap();
        let c = t.get("default", "x").unwrap();
        assert!(c.is_hard());
        assert!(c.tags.contains("source=agent"));
    }

    #[test]
    fn iteration_keeps_first_definition_order() {
        let mut t = ClassTable::new();
        for name in ["c", "a", "b"] {
            t.put("default", name, true, no_tags()).unwrap();
        }
        t.put("default", "c", true, ["again"]).unwrap();
        let names: Vec<&str> = t.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn filtered_iteration() {
        let mut t = ClassTable::new();
        t.put("default", "linux", false, no_tags()).unwrap();
        t.put("default", "web", true, no_tags()).unwrap();
        t.put("ops", "db", true, no_tags()).unwrap();

        let soft: Vec<&str> = t
            .iter_filtered(None, false, true)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(soft, vec!["web", "db"]);

        let default_all: Vec<&str> = t
            .iter_filtered(Some("default"), true, true)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(default_all, vec!["linux", "web"]);
    }

    #[test]
    fn clear_reports_previous_contents() {
        let mut t = ClassTable::new();
        assert!(!t.clear());
        t.put("default", "a", true, no_tags()).unwrap();
        assert!(t.clear());
        assert_eq!(t.len(), 0);
    }
}
