//! Charset records and their registry.
//!
//! A [Charset] couples a name and an ISO 2022 shape with the functions
//! translating its codes to and from Unicode. Records are created on first
//! lookup and cached for the life of the process; the four "unknown"
//! sentinels stand in for anything that cannot be resolved, translating
//! one-to-one on output and refusing reverse translation.

use crate::{
    backend::{BackendMask, Backends},
    config::Config,
    mapping::{MapSize, Mapping},
    other::{self, OtherCodec},
};
use std::borrow::Cow;
use std::rc::Rc;
use tracing::{debug, warn};

/// The shape of a character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetKind {
    /// 94 codes in `0x21..=0x7E`.
    Code94,
    /// 96 codes in `0x20..=0x7F`.
    Code96,
    /// 128 codes; the GR half of an 8-bit set.
    Code128,
    /// Two 94-code bytes.
    Matrix9494,
    /// Two 96-code bytes.
    Matrix9696,
    /// A 94-code row byte with a 192-code cell byte (Big 5).
    Matrix94192,
    /// Non-ISO-2022 multibyte encoding.
    Other,
}

impl CharsetKind {
    /// Bytes per character in the ISO 2022 byte stream.
    pub fn width(self) -> usize {
        match self {
            CharsetKind::Matrix9494 | CharsetKind::Matrix9696 | CharsetKind::Matrix94192 => 2,
            _ => 1,
        }
    }

    pub fn map_size(self) -> MapSize {
        match self {
            CharsetKind::Code94 | CharsetKind::Code96 | CharsetKind::Code128 => MapSize::Bits8,
            _ => MapSize::Bits16,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            CharsetKind::Code94 => "94 codes",
            CharsetKind::Code96 => "96 codes",
            CharsetKind::Code128 => "128 codes",
            CharsetKind::Matrix9494 => "94x94 codes",
            CharsetKind::Matrix9696 => "96x96 codes",
            CharsetKind::Matrix94192 => "94x192 codes",
            CharsetKind::Other => "non-ISO-2022",
        }
    }
}

enum CharsetOps {
    /// One-to-one on output, unmapped on input; the sentinels.
    Identity,
    /// A code table from one of the backends.
    Table { mapping: Rc<Mapping>, shift: u32 },
    /// A non-ISO-2022 codec.
    Other(OtherCodec),
}

/// An immutable, shared charset record.
pub struct Charset {
    pub name: Cow<'static, str>,
    pub kind: CharsetKind,
    /// The ISO 2022 designator final, or 0 for non-designable sets.
    pub final_byte: u8,
    ops: CharsetOps,
}

fn is_gl(code: u32) -> bool {
    (0x20..0x80).contains(&code)
}

impl Charset {
    /// Forward translation: charset code to Unicode.
    pub fn recode(&self, code: u32) -> Option<u32> {
        match &self.ops {
            CharsetOps::Identity => Some(code),
            CharsetOps::Table { mapping, shift } => mapping.forward(code + shift),
            CharsetOps::Other(codec) => codec.forward(code),
        }
    }

    /// Reverse translation: Unicode to a charset code, validated against
    /// this set's shape.
    pub fn reverse(&self, ucs: u32) -> Option<u32> {
        match &self.ops {
            CharsetOps::Identity => None,
            CharsetOps::Other(codec) => codec.reverse(ucs),
            CharsetOps::Table { mapping, shift } => {
                let raw = mapping.reverse(ucs)?;
                let code = raw.checked_sub(*shift)?;
                let valid = match self.kind {
                    CharsetKind::Code94 | CharsetKind::Code96 => is_gl(code),
                    CharsetKind::Code128 => code < 0x80,
                    CharsetKind::Matrix9494 | CharsetKind::Matrix9696 => {
                        is_gl(code >> 8) && is_gl(code & 0xFF)
                    }
                    CharsetKind::Matrix94192 => is_gl(code >> 8) && is_gl(code & 0x7F),
                    CharsetKind::Other => true,
                };
                valid.then_some(code)
            }
        }
    }

    /// True for the "unknown" sentinels.
    pub fn is_unknown(&self) -> bool {
        matches!(self.ops, CharsetOps::Identity)
    }

    pub fn other_codec(&self) -> Option<&OtherCodec> {
        match &self.ops {
            CharsetOps::Other(codec) => Some(codec),
            _ => None,
        }
    }
}

/// Case-insensitive comparison ignoring whitespace, `-`, `_` and `/`.
pub fn fuzzy_eq(left: &str, right: &str) -> bool {
    fn significant(c: &char) -> bool {
        !(c.is_whitespace() || *c == '-' || *c == '_' || *c == '/')
    }
    let l = left.chars().filter(significant).map(|c| c.to_ascii_lowercase());
    let r = right.chars().filter(significant).map(|c| c.to_ascii_lowercase());
    l.eq(r)
}

/// A designable or named charset backed by font-encoding data.
pub struct FontencCharset {
    pub name: &'static str,
    pub kind: CharsetKind,
    pub final_byte: u8,
    /// The name the mapping data is published under.
    pub xlfd: &'static str,
    /// Offset applied to codes before the mapping lookup; `0x80` moves a
    /// GL code into the upper half of an 8-bit table.
    pub shift: u32,
}

/// The charsets this filter knows how to designate or name.
///
/// The `xlfd` column is the name used by the X font-encoding package,
/// where that has a corresponding built-in table or `.enc` file.
#[rustfmt::skip]
pub static FONTENC_CHARSETS: [FontencCharset; 49] = [
    FontencCharset { name: "ISO 646 (1973)", kind: CharsetKind::Code94,      final_byte: b'@', xlfd: "iso646.1973-0",    shift: 0x00 },
    FontencCharset { name: "ASCII",          kind: CharsetKind::Code94,      final_byte: b'B', xlfd: "iso8859-1",        shift: 0x00 },
    FontencCharset { name: "JIS X 0201:GL",  kind: CharsetKind::Code94,      final_byte: b'J', xlfd: "jisx0201.1976-0",  shift: 0x00 },
    FontencCharset { name: "JIS X 0201:GR",  kind: CharsetKind::Code94,      final_byte: b'I', xlfd: "jisx0201.1976-0",  shift: 0x80 },
    FontencCharset { name: "DEC Special",    kind: CharsetKind::Code94,      final_byte: b'0', xlfd: "dec-special",      shift: 0x00 },
    FontencCharset { name: "DEC Technical",  kind: CharsetKind::Code94,      final_byte: b'>', xlfd: "dec-technical",    shift: 0x00 },

    FontencCharset { name: "ISO 8859-1",     kind: CharsetKind::Code96,      final_byte: b'A', xlfd: "iso8859-1",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-2",     kind: CharsetKind::Code96,      final_byte: b'B', xlfd: "iso8859-2",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-3",     kind: CharsetKind::Code96,      final_byte: b'C', xlfd: "iso8859-3",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-4",     kind: CharsetKind::Code96,      final_byte: b'D', xlfd: "iso8859-4",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-5",     kind: CharsetKind::Code96,      final_byte: b'L', xlfd: "iso8859-5",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-6",     kind: CharsetKind::Code96,      final_byte: b'G', xlfd: "iso8859-6",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-7",     kind: CharsetKind::Code96,      final_byte: b'F', xlfd: "iso8859-7",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-8",     kind: CharsetKind::Code96,      final_byte: b'H', xlfd: "iso8859-8",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-9",     kind: CharsetKind::Code96,      final_byte: b'M', xlfd: "iso8859-9",        shift: 0x80 },
    FontencCharset { name: "ISO 8859-10",    kind: CharsetKind::Code96,      final_byte: b'V', xlfd: "iso8859-10",       shift: 0x80 },
    FontencCharset { name: "ISO 8859-11",    kind: CharsetKind::Code96,      final_byte: b'T', xlfd: "iso8859-11",       shift: 0x80 },
    FontencCharset { name: "TIS 620",        kind: CharsetKind::Code96,      final_byte: b'T', xlfd: "iso8859-11",       shift: 0x80 },
    FontencCharset { name: "ISO 8859-13",    kind: CharsetKind::Code96,      final_byte: b'Y', xlfd: "iso8859-13",       shift: 0x80 },
    FontencCharset { name: "ISO 8859-14",    kind: CharsetKind::Code96,      final_byte: b'_', xlfd: "iso8859-14",       shift: 0x80 },
    FontencCharset { name: "ISO 8859-15",    kind: CharsetKind::Code96,      final_byte: b'b', xlfd: "iso8859-15",       shift: 0x80 },
    FontencCharset { name: "ISO 8859-16",    kind: CharsetKind::Code96,      final_byte: b'f', xlfd: "iso8859-16",       shift: 0x80 },
    FontencCharset { name: "KOI8-E",         kind: CharsetKind::Code96,      final_byte: b'@', xlfd: "koi8-e",           shift: 0x80 },
    FontencCharset { name: "TCVN",           kind: CharsetKind::Code96,      final_byte: b'Z', xlfd: "tcvn-0",           shift: 0x80 },

    FontencCharset { name: "GB 2312",        kind: CharsetKind::Matrix9494,  final_byte: b'A', xlfd: "gb2312.1980-0",    shift: 0x0000 },
    FontencCharset { name: "JIS X 0208",     kind: CharsetKind::Matrix9494,  final_byte: b'B', xlfd: "jisx0208.1990-0",  shift: 0x0000 },
    FontencCharset { name: "KSC 5601",       kind: CharsetKind::Matrix9494,  final_byte: b'C', xlfd: "ksc5601.1987-0",   shift: 0x0000 },
    FontencCharset { name: "JIS X 0212",     kind: CharsetKind::Matrix9494,  final_byte: b'D', xlfd: "jisx0212.1990-0",  shift: 0x0000 },

    FontencCharset { name: "GB 2312",        kind: CharsetKind::Matrix9696,  final_byte: b'A', xlfd: "gb2312.1980-0",    shift: 0x0000 },
    FontencCharset { name: "JIS X 0208",     kind: CharsetKind::Matrix9696,  final_byte: b'B', xlfd: "jisx0208.1990-0",  shift: 0x0000 },
    FontencCharset { name: "KSC 5601",       kind: CharsetKind::Matrix9696,  final_byte: b'C', xlfd: "ksc5601.1987-0",   shift: 0x0000 },
    FontencCharset { name: "JIS X 0212",     kind: CharsetKind::Matrix9696,  final_byte: b'D', xlfd: "jisx0212.1990-0",  shift: 0x0000 },

    FontencCharset { name: "CNS11643-1",     kind: CharsetKind::Matrix9494,  final_byte: b'G', xlfd: "cns11643-1",       shift: 0x0000 },
    FontencCharset { name: "CNS11643-2",     kind: CharsetKind::Matrix9494,  final_byte: b'H', xlfd: "cns11643-2",       shift: 0x0000 },
    FontencCharset { name: "CNS11643-3",     kind: CharsetKind::Matrix9494,  final_byte: b'I', xlfd: "cns11643-3",       shift: 0x0000 },

    FontencCharset { name: "KOI8-R",         kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "koi8-r",           shift: 0x80 },
    FontencCharset { name: "KOI8-U",         kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "koi8-u",           shift: 0x80 },
    FontencCharset { name: "KOI8-RU",        kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "koi8-ru",          shift: 0x80 },
    FontencCharset { name: "CP 1250",        kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "microsoft-cp1250", shift: 0x80 },
    FontencCharset { name: "CP 1251",        kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "microsoft-cp1251", shift: 0x80 },
    FontencCharset { name: "CP 1252",        kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "microsoft-cp1252", shift: 0x80 },
    FontencCharset { name: "CP 1254",        kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "microsoft-cp1254", shift: 0x80 },
    FontencCharset { name: "CP 1255",        kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "microsoft-cp1255", shift: 0x80 },
    FontencCharset { name: "CP 1257",        kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "microsoft-cp1257", shift: 0x80 },
    FontencCharset { name: "CP 437",         kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "ibm-cp437",        shift: 0x80 },
    FontencCharset { name: "CP 850",         kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "ibm-cp850",        shift: 0x80 },
    FontencCharset { name: "CP 852",         kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "ibm-cp852",        shift: 0x80 },
    FontencCharset { name: "CP 866",         kind: CharsetKind::Code128,     final_byte: 0,    xlfd: "ibm-cp866",        shift: 0x80 },

    // Big 5 is designated only implicitly, through its locale
    FontencCharset { name: "Big 5",          kind: CharsetKind::Matrix94192, final_byte: 0,    xlfd: "big5.eten-0",      shift: 0x8000 },
];

/// Finds a charset by its display name or its `xlfd` field. The `:GR`
/// variant is preferred when a bare data name is ambiguous between the
/// two halves of JIS X 0201.
pub fn fontenc_by_name(name: &str) -> Option<&'static FontencCharset> {
    let found = FONTENC_CHARSETS.iter().find(|fc| {
        fuzzy_eq(fc.name, name) || (!fc.name.contains(":GL") && fuzzy_eq(fc.xlfd, name))
    });
    if found.is_some() {
        return found;
    }
    if !name.contains(':') {
        return FONTENC_CHARSETS
            .iter()
            .find(|fc| fuzzy_eq(fc.name, &format!("{name}:GR")));
    }
    None
}

/// The charset registry: resolves designator finals and names, caching
/// every record for the process lifetime.
pub struct Charsets {
    backends: Backends,
    cache: Vec<Rc<Charset>>,
    /// Names whose mapping load failed; skipped on later lookups.
    failed: Vec<&'static str>,
    unknown: [Rc<Charset>; 4],
}

impl Charsets {
    pub fn new(config: Rc<Config>) -> Self {
        fn sentinel(name: &'static str, kind: CharsetKind) -> Rc<Charset> {
            Rc::new(Charset {
                name: Cow::Borrowed(name),
                kind,
                final_byte: 0,
                ops: CharsetOps::Identity,
            })
        }
        Self {
            backends: Backends::new(config),
            cache: Vec::new(),
            failed: Vec::new(),
            unknown: [
                sentinel("Unknown (94)", CharsetKind::Code94),
                sentinel("Unknown (96)", CharsetKind::Code96),
                sentinel("Unknown (94x94)", CharsetKind::Matrix9494),
                sentinel("Unknown (96x96)", CharsetKind::Matrix9696),
            ],
        }
    }

    pub fn config(&self) -> &Config {
        self.backends.config()
    }

    pub fn backends(&mut self) -> &mut Backends {
        &mut self.backends
    }

    /// Enumerates every charset the registry can resolve, for the
    /// reports. Availability of the backing data is not checked here.
    pub fn all_known() -> impl Iterator<Item = &'static FontencCharset> {
        FONTENC_CHARSETS.iter()
    }

    /// The shared sentinel of the given shape.
    pub fn unknown(&self, kind: CharsetKind) -> Rc<Charset> {
        match kind {
            CharsetKind::Code96 => self.unknown[1].clone(),
            CharsetKind::Matrix9494 => self.unknown[2].clone(),
            CharsetKind::Matrix9696 => self.unknown[3].clone(),
            _ => self.unknown[0].clone(),
        }
    }

    fn cached(
        &self,
        selector: Option<(u8, CharsetKind)>,
        name: Option<&str>,
    ) -> Option<Rc<Charset>> {
        self.cache
            .iter()
            .find(|c| {
                selector.is_some_and(|(final_byte, kind)| {
                    c.kind == kind && c.final_byte == final_byte
                }) || name.is_some_and(|n| fuzzy_eq(&c.name, n))
            })
            .cloned()
    }

    fn is_failed(&self, name: &str) -> bool {
        self.failed.iter().any(|f| fuzzy_eq(f, name))
    }

    fn load_fontenc_charset(&mut self, fc: &'static FontencCharset) -> Option<Rc<Charset>> {
        if self.is_failed(fc.name) {
            return None;
        }
        let mapping = self
            .backends
            .lookup(fc.xlfd, BackendMask::ANY, fc.kind.map_size());
        let Some(mapping) = mapping
            else {
                warn!("no mapping data for '{}' ({})", fc.name, fc.xlfd);
                self.failed.push(fc.name);
                return None;
            };
        let charset = Rc::new(Charset {
            name: Cow::Borrowed(fc.name),
            kind: fc.kind,
            final_byte: fc.final_byte,
            ops: CharsetOps::Table {
                mapping,
                shift: fc.shift,
            },
        });
        debug!("cached charset '{}'", charset.name);
        self.cache.push(charset.clone());
        Some(charset)
    }

    /// Resolves an ISO 2022 designation. Never fails: an unrecognised or
    /// unloadable final binds the "unknown" sentinel of the right shape.
    pub fn get_by_final(&mut self, final_byte: u8, kind: CharsetKind) -> Rc<Charset> {
        if let Some(found) = self.cached(Some((final_byte, kind)), None) {
            return found;
        }
        let row = FONTENC_CHARSETS
            .iter()
            .find(|fc| fc.kind == kind && fc.final_byte == final_byte && final_byte != 0);
        if let Some(charset) = row.and_then(|fc| self.load_fontenc_charset(fc)) {
            return charset;
        }
        debug!(
            "using unknown {} charset for final 0x{final_byte:02X}",
            kind.describe()
        );
        self.unknown(kind)
    }

    /// Resolves a charset name. Never fails: unknown names yield the
    /// 94-code sentinel.
    pub fn get_by_name(&mut self, name: &str) -> Rc<Charset> {
        if let Some(found) = self.cached(None, Some(name)) {
            return found;
        }

        let row = FONTENC_CHARSETS.iter().find(|fc| fuzzy_eq(fc.name, name));
        if let Some(charset) = row.and_then(|fc| self.load_fontenc_charset(fc)) {
            return charset;
        }

        if let Some((codec_name, codec)) = other::open(name, &mut self.backends) {
            let charset = Rc::new(Charset {
                name: Cow::Borrowed(codec_name),
                kind: CharsetKind::Other,
                final_byte: 0,
                ops: CharsetOps::Other(codec),
            });
            debug!("cached charset '{}'", charset.name);
            self.cache.push(charset.clone());
            return charset;
        }

        // A single-byte encoding the backends know but the table does
        // not: synthesise an 8-bit record around it, used via GR.
        if !self.is_failed(name) {
            let mask = BackendMask::FONTENC | BackendMask::BUILTIN | BackendMask::ICONV;
            if let Some(mapping) = self.backends.lookup(name, mask, MapSize::Any) {
                if mapping.table_size() <= 0x100 {
                    let charset = Rc::new(Charset {
                        name: Cow::Owned(name.to_string()),
                        kind: CharsetKind::Code128,
                        final_byte: 0,
                        ops: CharsetOps::Table {
                            mapping,
                            shift: 0x80,
                        },
                    });
                    debug!("cached synthesised charset '{}'", charset.name);
                    self.cache.push(charset.clone());
                    return charset;
                }
            }
        }

        debug!("no match for '{name}', using unknown 94-charset");
        self.unknown(CharsetKind::Code94)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Charsets {
        let mut config = Config::new();
        // builtin only, to keep the tests independent of the host's data
        config.set_lookup_order("builtin").unwrap();
        config.lookup_order.truncate(1);
        Charsets::new(Rc::new(config))
    }

    #[test]
    fn names_compare_fuzzily() {
        assert!(fuzzy_eq("ISO 8859-1", "iso8859-1"));
        assert!(fuzzy_eq("ISO_8859/1", "iso 8859 1"));
        assert!(fuzzy_eq("Big 5", "big5"));
        assert!(!fuzzy_eq("ISO 8859-1", "ISO 8859-2"));
    }

    #[test]
    fn lookup_by_final_designates_known_sets() {
        let mut reg = registry();
        let latin1 = reg.get_by_final(b'A', CharsetKind::Code96);
        assert_eq!(latin1.name, "ISO 8859-1");
        assert_eq!(latin1.recode(0x69), Some(0xE9));
        assert_eq!(latin1.reverse(0xE9), Some(0x69));

        // same designation yields the same record
        let again = reg.get_by_final(b'A', CharsetKind::Code96);
        assert!(Rc::ptr_eq(&latin1, &again));
    }

    #[test]
    fn unknown_finals_bind_sentinels() {
        let mut reg = registry();
        let unknown = reg.get_by_final(b'!', CharsetKind::Matrix9494);
        assert!(unknown.is_unknown());
        assert_eq!(unknown.kind, CharsetKind::Matrix9494);
        assert_eq!(unknown.recode(0x2422), Some(0x2422));
        assert_eq!(unknown.reverse(0x2422), None);
    }

    #[test]
    fn lookup_by_name_is_normalised() {
        let mut reg = registry();
        let a = reg.get_by_name("ISO 8859-5");
        let b = reg.get_by_name("iso8859-5");
        let c = reg.get_by_name("ISO_8859/5");
        assert!(Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&a, &c));
        assert_eq!(a.name, "ISO 8859-5");
    }

    #[test]
    fn failed_loads_are_remembered() {
        let mut reg = registry();
        // no builtin table for DEC Technical, and posix was trimmed off
        let missing = reg.get_by_name("DEC Technical");
        assert!(missing.is_unknown());
        assert!(reg.is_failed("DEC Technical"));
        let again = reg.get_by_name("DEC Technical");
        assert!(again.is_unknown());
    }

    #[test]
    #[tracing_test::traced_test]
    fn missing_mapping_data_is_reported() {
        let mut reg = registry();
        reg.get_by_name("DEC Technical");
        assert!(logs_contain("no mapping data"));
    }

    #[test]
    fn jis_gr_half_is_found_by_its_data_name() {
        let fc = fontenc_by_name("jisx0201.1976-0").unwrap();
        assert_eq!(fc.name, "JIS X 0201:GR");
        assert_eq!(fc.shift, 0x80);
    }
}
