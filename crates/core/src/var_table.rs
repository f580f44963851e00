//! Insertion-ordered variable store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::reference::VarRef;
use crate::value::{DataType, Value};

/// A defined variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub reference: VarRef,
    pub value: Value,
    pub data_type: DataType,
    pub tags: BTreeSet<String>,
}

/// Store of variables keyed by their full reference, indices included.
///
/// Callers are expected to qualify references before storing them so that
/// `x` and `default:main.x` never name two different entries.
#[derive(Debug, Default, Clone)]
pub struct VarTable {
    entries: BTreeMap<u64, Variable>,
    index: HashMap<VarRef, u64>,
    next_seq: u64,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or overwrite a variable. Overwriting keeps its position.
    pub fn put<I, S>(&mut self, reference: VarRef, value: Value, data_type: DataType, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variable = Variable {
            reference: reference.clone(),
            value,
            data_type,
            tags: tags.into_iter().map(Into::into).collect(),
        };

        if let Some(existing) = self.index.get(&reference).and_then(|seq| self.entries.get_mut(seq)) {
            *existing = variable;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(seq, variable);
        self.index.insert(reference, seq);
    }

    pub fn get(&self, reference: &VarRef) -> Option<&Variable> {
        let seq = self.index.get(reference)?;
        self.entries.get(seq)
    }

    pub fn contains(&self, reference: &VarRef) -> bool {
        self.index.contains_key(reference)
    }

    /// Remove a variable. Returns false if it was not present.
    pub fn remove(&mut self, reference: &VarRef) -> bool {
        match self.index.remove(reference) {
            Some(seq) => self.entries.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Remove every variable. Returns false if the table was already empty.
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

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.values()
    }

    /// Variables matching every filter part that is `Some`.
    ///
    /// `lval` matches exactly, so `conf` selects `conf`, `conf[a]` and
    /// `conf[a][b]` but not `config`.
    pub fn iter_filtered<'a>(
        &'a self,
        ns: Option<&'a str>,
        scope: Option<&'a str>,
        lval: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Variable> + 'a {
        self.entries.values().filter(move |v| {
            let r = &v.reference;
            ns.map_or(true, |ns| r.ns.as_deref() == Some(ns))
                && scope.map_or(true, |scope| r.scope.as_deref() == Some(scope))
                && lval.map_or(true, |lval| r.lval == lval)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(text: &str) -> VarRef {
        VarRef::parse(text).unwrap()
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut t = VarTable::new();
        t.put(r("default:main.a"), Value::scalar("1"), DataType::String, Vec::<String>::new());
        t.put(r("default:main.b"), Value::scalar("2"), DataType::String, Vec::<String>::new());
        t.put(r("default:main.a"), Value::scalar("3"), DataType::Int, ["n"]);

        let seen: Vec<(String, String)> = t
            .iter()
            .map(|v| (v.reference.lval.clone(), v.value.to_string()))
            .collect();
        assert_eq!(
            seen,
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(t.get(&r("default:main.a")).unwrap().data_type, DataType::Int);
    }

    #[test]
    fn indices_are_part_of_the_key() {
        let mut t = VarTable::new();
        t.put(r("default:main.conf[port]"), Value::scalar("80"), DataType::String, Vec::<String>::new());
        t.put(r("default:main.conf[host]"), Value::scalar("h"), DataType::String, Vec::<String>::new());
        assert_eq!(t.len(), 2);
        assert!(t.get(&r("default:main.conf")).is_none());
        assert!(t.remove(&r("default:main.conf[port]")));
        assert!(!t.remove(&r("default:main.conf[port]")));
    }

    #[test]
    fn filter_on_lval_is_exact() {
        let mut t = VarTable::new();
        for name in ["default:main.conf[a]", "default:main.config", "default:other.conf"] {
            t.put(r(name), Value::scalar("x"), DataType::String, Vec::<String>::new());
        }
        let hits: Vec<String> = t
            .iter_filtered(Some("default"), Some("main"), Some("conf"))
            .map(|v| v.reference.to_string())
            .collect();
        assert_eq!(hits, vec!["default:main.conf[a]"]);
        assert_eq!(t.iter_filtered(None, None, Some("conf")).count(), 2);
    }
}
