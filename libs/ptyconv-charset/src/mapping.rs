use crate::charset::fuzzy_eq;
use std::rc::Rc;
use tracing::trace;

/// Table size of a single-byte mapping.
pub const MAX8: usize = 0x100;
/// Table size of a double-byte mapping.
pub const MAX16: usize = 0x10000;

/// Requested shape of a code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSize {
    /// Let the backend probe for the size.
    Any,
    /// Single-byte, codes `0..=0xFF`.
    Bits8,
    /// Double-byte, codes `row * 256 + column`.
    Bits16,
}

impl MapSize {
    pub fn table_size(self) -> Option<usize> {
        match self {
            MapSize::Any => None,
            MapSize::Bits8 => Some(MAX8),
            MapSize::Bits16 => Some(MAX16),
        }
    }
}

/// A forward/reverse mapping between charset codes and Unicode.
///
/// The forward side is a dense table indexed by code; zero entries mean
/// "unmapped" (code 0 itself is always NUL). The reverse side is the full
/// pair set sorted by Unicode value, searched binarily during user-to-child
/// translation.
pub struct Mapping {
    name: String,
    forward: Vec<u32>,
    reverse: Vec<(u32, u32)>,
}

impl Mapping {
    /// Builds a mapping from a dense `code -> ucs` table.
    pub fn from_forward(name: &str, forward: Vec<u32>) -> Self {
        debug_assert!(forward.len() == MAX8 || forward.len() == MAX16);

        let mut reverse: Vec<(u32, u32)> = forward
            .iter()
            .enumerate()
            .filter(|&(_, &ucs)| ucs != 0)
            .map(|(code, &ucs)| (ucs, code as u32))
            .collect();
        reverse.sort_by_key(|&(ucs, _)| ucs);

        trace!(
            "mapping '{}': {} codes, {} reversible",
            name,
            forward.len(),
            reverse.len()
        );

        Self {
            name: name.to_string(),
            forward,
            reverse,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of forward table entries (256 or 65536).
    pub fn table_size(&self) -> usize {
        self.forward.len()
    }

    /// Translates a charset code into a Unicode code point.
    pub fn forward(&self, code: u32) -> Option<u32> {
        if code == 0 {
            return Some(0);
        }
        match self.forward.get(code as usize) {
            Some(0) | None => None,
            Some(&ucs) => Some(ucs),
        }
    }

    /// Translates a Unicode code point back into a charset code. When
    /// several codes map to the same value, the lowest code wins.
    pub fn reverse(&self, ucs: u32) -> Option<u32> {
        let index = self.reverse.partition_point(|&(u, _)| u < ucs);
        match self.reverse.get(index) {
            Some(&(u, code)) if u == ucs => Some(code),
            _ => None,
        }
    }

    /// All defined `(code, ucs)` pairs in code order, for the reports.
    pub fn defined(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.forward
            .iter()
            .enumerate()
            .filter(|&(_, &ucs)| ucs != 0)
            .map(|(code, &ucs)| (code as u32, ucs))
    }
}

/// The process-wide cache of loaded mappings, keyed by encoding name.
///
/// Append-only; entries live until process shutdown.
#[derive(Default)]
pub struct MappingCache {
    list: Vec<Rc<Mapping>>,
}

impl MappingCache {
    pub fn find(&self, name: &str) -> Option<Rc<Mapping>> {
        self.list
            .iter()
            .find(|m| fuzzy_eq(m.name(), name))
            .cloned()
    }

    pub fn insert(&mut self, mapping: Mapping) -> Rc<Mapping> {
        let entry = Rc::new(mapping);
        self.list.push(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latin5ish() -> Mapping {
        let mut forward = vec![0u32; MAX8];
        for code in 0x20..0x7F {
            forward[code] = code as u32;
        }
        forward[0xD0] = 0x011E; // G-breve
        forward[0xFD] = 0x0131; // dotless i
        Mapping::from_forward("test-latin5", forward)
    }

    #[test]
    fn forward_and_reverse_agree() {
        let m = latin5ish();
        assert_eq!(m.forward(0x41), Some(0x41));
        assert_eq!(m.forward(0xD0), Some(0x011E));
        assert_eq!(m.forward(0xD1), None);
        assert_eq!(m.reverse(0x011E), Some(0xD0));
        assert_eq!(m.reverse(0x011F), None);

        // Round-trip invariant: forward(reverse(u)) == u for every
        // reversible u.
        for (_, ucs) in m.defined() {
            let code = m.reverse(ucs).unwrap();
            assert_eq!(m.forward(code), Some(ucs));
        }
    }

    #[test]
    fn cache_matches_names_fuzzily() {
        let mut cache = MappingCache::default();
        cache.insert(latin5ish());
        assert!(cache.find("TEST LATIN5").is_some());
        assert!(cache.find("test_latin-5").is_some());
        assert!(cache.find("test-latin9").is_none());
    }
}
