//! collect — sinks for (name, value) pairs produced by enumeration.
//!
//! Any `FnMut(&str, &str)` is a collector; `PropListCollector` builds an
//! ordered snapshot where the first occurrence of a name wins. When several
//! sources feed one collector, the enumeration order fixes precedence.

use std::collections::BTreeMap;

/// Ordered name -> value snapshot; names are unique.
pub type PropList = BTreeMap<String, String>;

pub trait PropCollector {
    fn record(&mut self, name: &str, value: &str);
}

impl<F> PropCollector for F
where
    F: FnMut(&str, &str),
{
    fn record(&mut self, name: &str, value: &str) {
        self(name, value)
    }
}

/// Appends into a `PropList`; an existing name is never overwritten.
pub struct PropListCollector<'a> {
    list: &'a mut PropList,
}

impl<'a> PropListCollector<'a> {
    pub fn new(list: &'a mut PropList) -> Self {
        Self { list }
    }
}

impl PropCollector for PropListCollector<'_> {
    fn record(&mut self, name: &str, value: &str) {
        self.list
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_wins() {
        let mut list = PropList::new();
        {
            let mut c = PropListCollector::new(&mut list);
            c.record("persist.a", "persisted");
            c.record("ro.b", "1");
            c.record("persist.a", "live");
        }
        assert_eq!(list.len(), 2);
        assert_eq!(list["persist.a"], "persisted");
        assert_eq!(list["ro.b"], "1");
    }

    #[test]
    fn closures_are_collectors() {
        let mut seen = Vec::new();
        let mut cb = |n: &str, v: &str| seen.push(format!("{n}={v}"));
        cb.record("x", "y");
        cb.record("x", "z");
        assert_eq!(seen, vec!["x=y", "x=z"]);
    }
}
