//! The header container shared by every message and by HPACK.
//!
//! Names are always stored lowercase — HTTP/2 mandates it on the wire and
//! HTTP/1 lowercases on parse, so there is never a reason to keep the
//! original case around. Values for a given name are kept in an ordered
//! `Vec` rather than folded eagerly, because `get(name, -1)` and indexed
//! `edit`/`extract` need positional access.

use std::fmt;

/// Error returned by any mutator on a [`HeaderMap`] that has been
/// [`HeaderMap::lock`]ed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("header map is locked")]
pub struct Locked;

#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
    locked: bool,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// One-way transition to read-only. Idempotent: locking an
    /// already-locked map is a no-op, not an error.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    fn check_unlocked(&self) -> Result<(), Locked> {
        if self.locked {
            Err(Locked)
        } else {
            Ok(())
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// First value for `name`, if any.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1[0].as_str())
    }

    /// Value at `index` among the values stored under `name`. Negative
    /// indices count from the end, Python-slice style (`-1` is the last
    /// value).
    pub fn get(&self, name: &str, index: isize) -> Option<&str> {
        let values = &self.entries[self.position(name)?].1;
        let idx = normalize_index(index, values.len())?;
        values.get(idx).map(String::as_str)
    }

    pub fn count(&self, name: &str) -> usize {
        self.position(name).map(|i| self.entries[i].1.len()).unwrap_or(0)
    }

    /// Replace all values under `name` with the single `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), Locked> {
        self.check_unlocked()?;
        let lname = name.to_ascii_lowercase();
        let value = value.into();
        match self.position(&lname) {
            Some(i) => self.entries[i].1 = vec![value],
            None => self.entries.push((lname, vec![value])),
        }
        Ok(())
    }

    /// Append `value` to the list under `name` (inserting the key if new).
    pub fn add(&mut self, name: &str, value: impl Into<String>) -> Result<(), Locked> {
        self.check_unlocked()?;
        let lname = name.to_ascii_lowercase();
        let value = value.into();
        match self.position(&lname) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((lname, vec![value])),
        }
        Ok(())
    }

    /// Replace the value at positional `index` under `name`.
    pub fn edit(&mut self, name: &str, index: isize, value: impl Into<String>) -> Result<(), Locked> {
        self.check_unlocked()?;
        if let Some(i) = self.position(name) {
            let values = &mut self.entries[i].1;
            if let Some(idx) = normalize_index(index, values.len()) {
                values[idx] = value.into();
            }
        }
        Ok(())
    }

    /// Remove every value under `name` and return the first one, if any
    /// were present.
    pub fn extract(&mut self, name: &str) -> Result<Option<String>, Locked> {
        self.check_unlocked()?;
        if let Some(i) = self.position(name) {
            let (_, mut values) = self.entries.remove(i);
            Ok(Some(values.remove(0)))
        } else {
            Ok(None)
        }
    }

    /// Concatenate `value` onto the existing first value under `name` using
    /// `separator` (default `", "`), or add it fresh if `name` is absent.
    /// HPACK's `cookie` re-folding on encode uses `"; "` explicitly here.
    pub fn append_with_separator(
        &mut self,
        name: &str,
        value: impl AsRef<str>,
        separator: &str,
    ) -> Result<(), Locked> {
        self.check_unlocked()?;
        let lname = name.to_ascii_lowercase();
        let value = value.as_ref();
        match self.position(&lname) {
            Some(i) => {
                let existing = &mut self.entries[i].1[0];
                existing.push_str(separator);
                existing.push_str(value);
            }
            None => self.entries.push((lname, vec![value.to_string()])),
        }
        Ok(())
    }

    pub fn append(&mut self, name: &str, value: impl AsRef<str>) -> Result<(), Locked> {
        self.append_with_separator(name, value, ", ")
    }

    pub fn delete(&mut self, name: &str) -> Result<(), Locked> {
        self.check_unlocked()?;
        if let Some(i) = self.position(name) {
            self.entries.remove(i);
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Flat `(name, value)` pairs in insertion order. Not a view: mutating
    /// the map afterwards does not affect an already-collected iterator's
    /// results.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).sum()
    }
}

fn normalize_index(index: isize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if index >= 0 {
        let i = index as usize;
        (i < len).then_some(i)
    } else {
        let from_end = (-index) as usize;
        (from_end <= len).then(|| len - from_end)
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_is_singular() {
        let mut h = HeaderMap::new();
        h.set("Content-Type", "text/plain").unwrap();
        assert_eq!(h.get_first("content-type"), Some("text/plain"));
        assert_eq!(h.count("content-type"), 1);
    }

    #[test]
    fn add_preserves_order_and_negative_index() {
        let mut h = HeaderMap::new();
        h.add("X-Trace", "a").unwrap();
        h.add("X-Trace", "b").unwrap();
        assert_eq!(h.get("x-trace", 0), Some("a"));
        assert_eq!(h.get("x-trace", -1), Some("b"));
        assert_eq!(h.count("x-trace"), 2);
    }

    #[test]
    fn names_are_lowercased_on_insert() {
        let mut h = HeaderMap::new();
        h.set("Host", "example.com").unwrap();
        assert_eq!(h.names().collect::<Vec<_>>(), vec!["host"]);
    }

    #[test]
    fn locked_map_rejects_mutation() {
        let mut h = HeaderMap::new();
        h.set("a", "1").unwrap();
        h.lock();
        assert!(h.set("a", "2").is_err());
        assert!(h.add("b", "1").is_err());
        assert!(h.delete("a").is_err());
        assert_eq!(h.get_first("a"), Some("1"));
    }

    #[test]
    fn lock_is_idempotent() {
        let mut h = HeaderMap::new();
        h.lock();
        h.lock();
        assert!(h.is_locked());
    }

    #[test]
    fn extract_removes_and_returns_first() {
        let mut h = HeaderMap::new();
        h.add("cookie", "a=1").unwrap();
        h.add("cookie", "b=2").unwrap();
        let v = h.extract("cookie").unwrap();
        assert_eq!(v, Some("a=1".to_string()));
        assert_eq!(h.count("cookie"), 0);
    }

    #[test]
    fn append_with_separator_folds_into_first_value() {
        let mut h = HeaderMap::new();
        h.add("cookie", "a=1").unwrap();
        h.append_with_separator("cookie", "b=2", "; ").unwrap();
        assert_eq!(h.get_first("cookie"), Some("a=1; b=2"));
        assert_eq!(h.count("cookie"), 1);
    }

    #[test]
    fn flat_iteration_sees_every_value() {
        let mut h = HeaderMap::new();
        h.add("a", "1").unwrap();
        h.add("a", "2").unwrap();
        h.set("b", "3").unwrap();
        let pairs: Vec<_> = h.iter().collect();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&("a", "1")));
        assert!(pairs.contains(&("a", "2")));
        assert!(pairs.contains(&("b", "3")));
    }
}
