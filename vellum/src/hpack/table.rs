//! The HPACK static table (loaded once from an embedded resource) and the
//! per-direction dynamic table with RFC 7541 §4.4 eviction.

use std::collections::VecDeque;
use std::sync::OnceLock;

use super::HpackError;

/// `(name, value)` pairs, indexed 1..=61 per RFC 7541 Appendix A. Loaded
/// once from the shipped resource file rather than hand-duplicated as a
/// Rust array, so the table and its text representation can never drift
/// apart.
fn static_table() -> &'static Vec<(String, String)> {
    static TABLE: OnceLock<Vec<(String, String)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let text = include_str!("../../resources/hpack_static_table.txt");
        let mut lines = text.lines();
        let header = lines.next().expect("resource has an INIT header");
        let mut parts = header.split_whitespace();
        assert_eq!(parts.next(), Some("INIT"));
        let base: usize = parts.next().unwrap().parse().unwrap();
        assert_eq!(base, 1, "hpack static table base index must be 1");
        let count: usize = parts.next().unwrap().parse().unwrap();

        let table: Vec<(String, String)> = lines
            .map(|line| {
                let mut fields = line.splitn(2, '\t');
                let name = fields.next().unwrap_or_default().to_string();
                let value = fields.next().unwrap_or_default().to_string();
                (name, value)
            })
            .collect();
        assert_eq!(table.len(), count, "hpack static table line count mismatch");
        table
    })
}

pub const STATIC_TABLE_LEN: usize = 61;

/// 1-indexed static table lookup. `index` must be in `1..=61`.
pub fn static_entry(index: usize) -> Option<(&'static str, &'static str)> {
    static_table().get(index.checked_sub(1)?).map(|(n, v)| (n.as_str(), v.as_str()))
}

pub fn static_exact_match(name: &str, value: &str) -> Option<usize> {
    static_table().iter().position(|(n, v)| n == name && v == value).map(|i| i + 1)
}

pub fn static_name_match(name: &str) -> Option<usize> {
    static_table().iter().position(|(n, _)| n == name).map(|i| i + 1)
}

#[derive(Clone)]
struct Entry {
    name: String,
    value: String,
    size: usize,
}

impl Entry {
    fn new(name: String, value: String) -> Self {
        let size = name.len() + value.len() + 32;
        Self { name, value, size }
    }
}

/// One direction's dynamic table. The encoder and decoder of a single
/// HTTP/2 endpoint each own one; the peer's SETTINGS `HEADER_TABLE_SIZE`
/// sets `settings_ceiling`, while `current_cap` (always `<= ceiling`) is
/// what's actually in effect, lowered on demand via a Dynamic Table Size
/// Update.
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    size: usize,
    settings_ceiling: u32,
    current_cap: u32,
}

impl DynamicTable {
    pub fn new(initial_settings_ceiling: u32) -> Self {
        Self { entries: VecDeque::new(), size: 0, settings_ceiling: initial_settings_ceiling, current_cap: initial_settings_ceiling }
    }

    pub fn current_cap(&self) -> u32 {
        self.current_cap
    }

    pub fn settings_ceiling(&self) -> u32 {
        self.settings_ceiling
    }

    /// Applies a new `HEADER_TABLE_SIZE` learned from the peer's SETTINGS.
    /// Lowers `current_cap` too if it now exceeds the new ceiling.
    pub fn set_settings_ceiling(&mut self, ceiling: u32) {
        self.settings_ceiling = ceiling;
        if self.current_cap > ceiling {
            self.current_cap = ceiling;
            self.evict_to(self.current_cap as usize);
        }
    }

    /// Applies an in-band Dynamic Table Size Update. Rejected if it would
    /// exceed the settings ceiling.
    pub fn set_current_cap(&mut self, cap: u32) -> Result<(), HpackError> {
        if cap > self.settings_ceiling {
            return Err(HpackError::TableSizeExceedsSettings { requested: cap, ceiling: self.settings_ceiling });
        }
        self.current_cap = cap;
        self.evict_to(cap as usize);
        Ok(())
    }

    fn evict_to(&mut self, max: usize) {
        while self.size > max {
            let Some(evicted) = self.entries.pop_back() else { break };
            self.size -= evicted.size;
        }
    }

    pub fn insert(&mut self, name: String, value: String) {
        let entry = Entry::new(name, value);
        if entry.size > self.current_cap as usize {
            // RFC 7541 §4.4: an entry larger than the table's capacity is
            // not an error; the table just ends up empty.
            self.entries.clear();
            self.size = 0;
            return;
        }
        self.size += entry.size;
        self.entries.push_front(entry);
        self.evict_to(self.current_cap as usize);
    }

    /// 1-indexed, most-recently-inserted first.
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        self.entries.get(index.checked_sub(1)?).map(|e| (e.name.as_str(), e.value.as_str()))
    }

    pub fn exact_match(&self, name: &str, value: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name && e.value == value).map(|i| i + 1)
    }

    pub fn name_match(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name).map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_has_61_entries_and_known_values() {
        assert_eq!(static_entry(1), Some((":authority", "")));
        assert_eq!(static_entry(2), Some((":method", "GET")));
        assert_eq!(static_entry(61), Some(("www-authenticate", "")));
        assert_eq!(static_entry(62), None);
    }

    #[test]
    fn static_exact_and_name_match() {
        assert_eq!(static_exact_match(":method", "GET"), Some(2));
        assert_eq!(static_name_match(":method"), Some(2));
        assert_eq!(static_exact_match(":method", "PATCH"), None);
    }

    #[test]
    fn dynamic_table_evicts_from_oldest_end() {
        let mut t = DynamicTable::new(60);
        t.insert("a".into(), "1".into()); // size 34
        t.insert("b".into(), "2".into()); // size 34, total 68 > 60 -> evict "a"
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(1), Some(("b", "2")));
    }

    #[test]
    fn size_update_cannot_exceed_settings_ceiling() {
        let mut t = DynamicTable::new(100);
        assert!(t.set_current_cap(200).is_err());
        assert!(t.set_current_cap(50).is_ok());
        assert_eq!(t.current_cap(), 50);
    }

    #[test]
    fn lowering_settings_ceiling_evicts_down_to_it() {
        let mut t = DynamicTable::new(1000);
        t.insert("name".into(), "value".into());
        assert_eq!(t.len(), 1);
        t.set_settings_ceiling(10);
        assert_eq!(t.len(), 0);
        assert_eq!(t.current_cap(), 10);
    }
}
