//! Built-in code tables.
//!
//! The minimum set of encodings needed when neither `.enc` files nor the
//! host iconv library can supply data.

use crate::{
    charset::fuzzy_eq,
    mapping::{Mapping, MappingCache},
    tables,
};
use std::rc::Rc;

pub struct BuiltinEncoding {
    pub name: &'static str,
    pub table: fn() -> Vec<u32>,
}

#[rustfmt::skip]
pub static BUILTIN_ENCODINGS: [BuiltinEncoding; 10] = [
    BuiltinEncoding { name: "iso8859-1",        table: tables::identity },
    BuiltinEncoding { name: "iso8859-5",        table: tables::iso8859_5::table },
    BuiltinEncoding { name: "iso8859-9",        table: tables::iso8859_9::table },
    BuiltinEncoding { name: "iso8859-11",       table: tables::iso8859_11::table },
    BuiltinEncoding { name: "iso8859-15",       table: tables::iso8859_15::table },
    BuiltinEncoding { name: "jisx0201.1976-0",  table: tables::jisx0201::table },
    BuiltinEncoding { name: "dec-special",      table: tables::dec_special::table },
    BuiltinEncoding { name: "microsoft-cp1254", table: tables::cp1254::table },
    BuiltinEncoding { name: "microsoft-cp1257", table: tables::cp1257::table },
    BuiltinEncoding { name: "iso646.1973-0",    table: ascii_1973 },
];

/// ISO 646-1973 IRV: ASCII except that 0x7E (tilde) is an overline in
/// some national uses; the IRV keeps it, so the table is plain ASCII.
fn ascii_1973() -> Vec<u32> {
    let mut table = vec![0u32; crate::mapping::MAX8];
    for (code, slot) in table.iter_mut().enumerate().take(0x80) {
        *slot = code as u32;
    }
    table
}

pub fn find(name: &str) -> Option<&'static BuiltinEncoding> {
    BUILTIN_ENCODINGS.iter().find(|e| fuzzy_eq(e.name, name))
}

pub fn lookup(cache: &mut MappingCache, name: &str) -> Option<Rc<Mapping>> {
    let encoding = find(name)?;
    Some(cache.insert(Mapping::from_forward(encoding.name, (encoding.table)())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_round_trip() {
        for encoding in BUILTIN_ENCODINGS.iter() {
            let mapping = Mapping::from_forward(encoding.name, (encoding.table)());
            for (_, ucs) in mapping.defined() {
                let code = mapping
                    .reverse(ucs)
                    .unwrap_or_else(|| panic!("{}: U+{:04X} not reversible", encoding.name, ucs));
                assert_eq!(mapping.forward(code), Some(ucs), "{}", encoding.name);
            }
        }
    }

    #[test]
    fn katakana_is_in_the_upper_half() {
        let mut cache = MappingCache::default();
        let jis = lookup(&mut cache, "JISX0201.1976-0").unwrap();
        assert_eq!(jis.forward(0xB1), Some(0xFF71));
        assert_eq!(jis.reverse(0xFF71), Some(0xB1));
        assert_eq!(jis.forward(0x5C), Some(0x00A5));
    }

    #[test]
    fn latin5_diverges_from_latin1_in_six_codes() {
        let latin5 = Mapping::from_forward("iso8859-9", tables::iso8859_9::table());
        let diverging = latin5
            .defined()
            .filter(|&(code, ucs)| code != ucs)
            .count();
        assert_eq!(diverging, 6);
    }
}
