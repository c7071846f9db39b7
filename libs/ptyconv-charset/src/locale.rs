//! Locale resolution.
//!
//! Turns a locale identifier into a charset name via the X locale.alias
//! file and the host locale database, then maps the charset name onto a
//! GL/GR configuration with up to four designated sets (or a non-ISO-2022
//! codec) through the locale-charset table.

mod alias_file;

pub use alias_file::lookup_alias;

use crate::{
    backend::BackendMask,
    charset::{fontenc_by_name, fuzzy_eq, Charset, Charsets, FontencCharset, FONTENC_CHARSETS},
    config::Config,
    mapping::MapSize,
};
use snafu::{OptionExt, Snafu};
use std::borrow::Cow;
use std::ffi::CStr;
use std::rc::Rc;
use tracing::{debug, warn};

#[derive(Debug, Snafu)]
pub enum LocaleError {
    #[snafu(display("unknown character set \"{charset}\""))]
    UnknownCharset { charset: String },
}

/// A row of the locale-charset table.
pub struct LocaleCharset {
    pub name: &'static str,
    pub gl: usize,
    pub gr: usize,
    pub g: [Option<&'static str>; 4],
    pub other: Option<&'static str>,
}

macro_rules! locale_row {
    ($name:literal, $gl:literal, $gr:literal, [$($g:expr),*], $other:expr) => {
        LocaleCharset { name: $name, gl: $gl, gr: $gr, g: [$($g),*], other: $other }
    };
}

#[rustfmt::skip]
pub static LOCALE_CHARSETS: [LocaleCharset; 45] = [
    locale_row!("C",          0, 2, [Some("ASCII"), None,               Some("ISO 8859-1"),    None],               None),
    locale_row!("POSIX",      0, 2, [Some("ASCII"), None,               Some("ISO 8859-1"),    None],               None),
    locale_row!("US-ASCII",   0, 2, [Some("ASCII"), None,               Some("ISO 8859-1"),    None],               None),

    locale_row!("ISO8859-1",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-1"),    None],               None),
    locale_row!("ISO8859-2",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-2"),    None],               None),
    locale_row!("ISO8859-3",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-3"),    None],               None),
    locale_row!("ISO8859-4",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-4"),    None],               None),
    locale_row!("ISO8859-5",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-5"),    None],               None),
    locale_row!("ISO8859-6",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-6"),    None],               None),
    locale_row!("ISO8859-7",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-7"),    None],               None),
    locale_row!("ISO8859-8",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-8"),    None],               None),
    locale_row!("ISO8859-9",  0, 2, [Some("ASCII"), None,               Some("ISO 8859-9"),    None],               None),
    locale_row!("ISO8859-10", 0, 2, [Some("ASCII"), None,               Some("ISO 8859-10"),   None],               None),
    locale_row!("ISO8859-11", 0, 2, [Some("ASCII"), None,               Some("ISO 8859-11"),   None],               None),
    locale_row!("TIS620",     0, 2, [Some("ASCII"), None,               Some("ISO 8859-11"),   None],               None),
    locale_row!("ISO8859-13", 0, 2, [Some("ASCII"), None,               Some("ISO 8859-13"),   None],               None),
    locale_row!("ISO8859-14", 0, 2, [Some("ASCII"), None,               Some("ISO 8859-14"),   None],               None),
    locale_row!("ISO8859-15", 0, 2, [Some("ASCII"), None,               Some("ISO 8859-15"),   None],               None),
    locale_row!("ISO8859-16", 0, 2, [Some("ASCII"), None,               Some("ISO 8859-16"),   None],               None),

    locale_row!("KOI8-E",     0, 2, [Some("ASCII"), None,               Some("KOI8-E"),        None],               None),
    locale_row!("KOI8-R",     0, 2, [Some("ASCII"), None,               Some("KOI8-R"),        None],               None),
    locale_row!("KOI8-U",     0, 2, [Some("ASCII"), None,               Some("KOI8-U"),        None],               None),
    locale_row!("KOI8-RU",    0, 2, [Some("ASCII"), None,               Some("KOI8-RU"),       None],               None),
    locale_row!("CP1250",     0, 2, [Some("ASCII"), None,               Some("CP 1250"),       None],               None),
    locale_row!("CP1251",     0, 2, [Some("ASCII"), None,               Some("CP 1251"),       None],               None),
    locale_row!("CP1252",     0, 2, [Some("ASCII"), None,               Some("CP 1252"),       None],               None),
    locale_row!("CP1254",     0, 2, [Some("ASCII"), None,               Some("CP 1254"),       None],               None),
    locale_row!("CP1255",     0, 2, [Some("ASCII"), None,               Some("CP 1255"),       None],               None),
    locale_row!("CP1257",     0, 2, [Some("ASCII"), None,               Some("CP 1257"),       None],               None),
    locale_row!("CP437",      0, 2, [Some("ASCII"), None,               Some("CP 437"),        None],               None),
    locale_row!("CP850",      0, 2, [Some("ASCII"), None,               Some("CP 850"),        None],               None),
    locale_row!("CP852",      0, 2, [Some("ASCII"), None,               Some("CP 852"),        None],               None),
    locale_row!("CP866",      0, 2, [Some("ASCII"), None,               Some("CP 866"),        None],               None),
    locale_row!("TCVN",       0, 2, [Some("ASCII"), None,               Some("TCVN"),          None],               None),

    locale_row!("GB2312",     0, 1, [Some("ASCII"), Some("GB 2312"),    None,                  None],               None),
    locale_row!("eucJP",      0, 1, [Some("ASCII"), Some("JIS X 0208"), Some("JIS X 0201:GR"), Some("JIS X 0212")], None),
    locale_row!("eucKR",      0, 1, [Some("ASCII"), Some("KSC 5601"),   None,                  None],               None),
    locale_row!("eucCN",      0, 1, [Some("ASCII"), Some("GB 2312"),    None,                  None],               None),
    locale_row!("eucTW",      0, 1, [Some("ASCII"), Some("CNS11643-1"), Some("CNS11643-2"),    Some("CNS11643-3")], None),
    locale_row!("Big5",       0, 1, [Some("ASCII"), Some("Big 5"),      None,                  None],               None),

    locale_row!("gbk",        0, 1, [None,          None,               None,                  None],               Some("GBK")),
    locale_row!("UTF-8",      0, 1, [None,          None,               None,                  None],               Some("UTF-8")),
    locale_row!("SJIS",       0, 1, [None,          None,               None,                  None],               Some("SJIS")),
    locale_row!("Big5-HKSCS", 0, 1, [None,          None,               None,                  None],               Some("BIG5-HKSCS")),
    locale_row!("gb18030",    0, 1, [None,          None,               None,                  None],               Some("GB18030")),
];

/// Finds the table row whose designated sets include the given charset.
pub fn find_locale_by_charset(charset: &str) -> Option<&'static LocaleCharset> {
    LOCALE_CHARSETS.iter().find(|lc| {
        if lc.g[1].is_none() && lc.g[2].is_none() {
            return false;
        }
        [3, 2, 1]
            .iter()
            .any(|&g| lc.g[g].is_some_and(|name| fuzzy_eq(charset, name)))
    })
}

/// For a charset that is one part of a composite encoding (e.g. JIS X
/// 0208 inside EUC-JP), the composite's locale name.
pub fn composite_charset(encoding_name: &str) -> Option<&'static str> {
    let fc = fontenc_by_name(encoding_name)?;
    let row = find_locale_by_charset(fc.name)?;
    debug!("composite charset of {encoding_name} is {}", row.name);
    Some(row.name)
}

/// The part designated into `G<g>` of a composite encoding.
pub fn composite_part(composite_name: &str, g: usize) -> Option<&'static FontencCharset> {
    let row = LOCALE_CHARSETS
        .iter()
        .find(|lc| fuzzy_eq(composite_name, lc.name))?;
    let part_name = row.g.get(g).copied().flatten()?;
    FONTENC_CHARSETS.iter().find(|fc| fuzzy_eq(part_name, fc.name))
}

fn ignorable(c: char) -> bool {
    c.is_whitespace() || c == '-' || c == '_' || c == '/'
}

/// Strips `prefix` from `name`, both compared fuzzily; the remainder must
/// be non-empty.
fn fuzzy_strip_prefix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let mut wanted = prefix.chars().filter(|c| !ignorable(*c)).peekable();
    for (index, c) in name.char_indices() {
        if ignorable(c) {
            continue;
        }
        if wanted.peek().is_none() {
            return Some(&name[index..]);
        }
        let expect = wanted.next().unwrap();
        if !expect.eq_ignore_ascii_case(&c) {
            return None;
        }
    }
    None
}

/// Spelling rewrites applied when a charset name does not match the
/// locale-charset table directly.
static PREFIX_REWRITES: [(&str, &str); 8] = [
    ("ISO-", "ISO "),
    ("DEC ", "DEC-"),
    ("IBM-CP", "CP "),
    ("IBM", "CP "),
    ("MICROSOFT-CP", "CP "),
    ("MICROSOFT", "CP "),
    ("CP-", "CP "),
    ("ANSI", "CP "),
];

fn find_locale_charset_row(charset: &str) -> Option<&'static LocaleCharset> {
    LOCALE_CHARSETS.iter().find(|lc| fuzzy_eq(lc.name, charset))
}

/// A matched (or synthesised) locale-charset record, names only.
struct MatchedLocale {
    gl: usize,
    gr: usize,
    g: [Option<Cow<'static, str>>; 4],
    other: Option<&'static str>,
}

impl MatchedLocale {
    fn from_row(row: &'static LocaleCharset) -> Self {
        Self {
            gl: row.gl,
            gr: row.gr,
            g: row.g.map(|name| name.map(Cow::Borrowed)),
            other: row.other,
        }
    }
}

fn match_locale_charset(registry: &mut Charsets, charset: &str) -> Option<MatchedLocale> {
    let mut charset = charset;
    if let Some(stripped) = charset.strip_suffix("@euro") {
        warn!("the euro character may not be supported");
        charset = stripped;
    }
    if charset.is_empty() {
        return None;
    }

    if let Some(row) = find_locale_charset_row(charset) {
        return Some(MatchedLocale::from_row(row));
    }

    for (prefix, replacement) in PREFIX_REWRITES.iter() {
        let Some(rest) = fuzzy_strip_prefix(charset, prefix).filter(|r| !r.is_empty())
            else {
                continue;
            };
        let target = format!("{replacement}{rest}");
        if let Some(row) = find_locale_charset_row(&target) {
            return Some(MatchedLocale::from_row(row));
        }
    }

    // The table is useful, but not complete. If the backends can supply
    // a mapping for an 8-bit encoding, fake a table entry.
    let mask = BackendMask::FONTENC | BackendMask::BUILTIN | BackendMask::ICONV;
    let mapping = registry.backends().lookup(charset, mask, MapSize::Any)?;

    let closest = match fontenc_by_name(charset) {
        Some(fc) => find_locale_by_charset(fc.name),
        None => find_locale_by_charset(charset),
    };
    if let Some(row) = closest {
        debug!("matched locale-charset record {} for {charset}", row.name);
        return Some(MatchedLocale::from_row(row));
    }

    if mapping.table_size() <= 0x100 {
        debug!("synthesising a locale-charset record for {charset}");
        return Some(MatchedLocale {
            gl: 0,
            gr: 2,
            g: [
                Some(Cow::Borrowed("ASCII")),
                None,
                Some(Cow::Owned(charset.to_string())),
                None,
            ],
            other: None,
        });
    }

    debug!("do not know how to fake a locale-charset record for {charset}");
    None
}

/// The initial pump configuration resolved from a locale.
pub struct ResolvedLocale {
    /// The charset name the locale resolved to.
    pub charset: String,
    pub gl: usize,
    pub gr: usize,
    pub g: [Option<Rc<Charset>>; 4],
    pub other: Option<Rc<Charset>>,
}

/// Checks that a resolved locale carries an encoding suffix.
fn has_encoding(locale: &str) -> bool {
    match locale.split_once('.') {
        Some((before, after)) => !before.is_empty() && !after.is_empty() && !after.contains('.'),
        None => false,
    }
}

fn langinfo_codeset() -> Option<String> {
    let ptr = unsafe { libc::nl_langinfo(libc::CODESET) };
    if ptr.is_null() {
        return None;
    }
    let codeset = unsafe { CStr::from_ptr(ptr) }.to_str().ok()?;
    (!codeset.is_empty()).then(|| codeset.to_string())
}

/// Resolves a locale name into a locale-with-encoding or charset name,
/// consulting the alias file and the host locale database.
pub fn resolve_locale(config: &Config, locale: &str) -> String {
    let mut resolved = lookup_alias(&config.alias_file, locale);
    let found = resolved.is_some();

    // If the alias file had no answer, or the answer does not name an
    // encoding, the host's own locale tables may do better.
    if !found || !has_encoding(resolved.as_deref().unwrap()) {
        let skip = config.ignore_locale
            || locale == "C"
            || locale == "POSIX"
            || locale == "US-ASCII";
        if !skip {
            if let Some(codeset) = langinfo_codeset() {
                debug!("nl_langinfo -> {codeset}");
                resolved = Some(codeset);
            }
        }
    }

    let resolved = resolved.unwrap_or_else(|| locale.to_string());
    debug!("resolved locale {locale} -> {resolved}");
    resolved
}

/// Resolves a locale (or explicit charset override) into the initial
/// GL/GR configuration and designated sets.
pub fn resolve_locale_state(
    registry: &mut Charsets,
    locale: &str,
    charset: Option<&str>,
) -> Result<ResolvedLocale, LocaleError> {
    let charset_name = match charset {
        Some(explicit) => explicit.to_string(),
        None if registry.config().ignore_locale => locale.to_string(),
        None => {
            let config = registry.config().clone();
            let resolved = resolve_locale(&config, locale);
            match resolved.rsplit_once('.') {
                Some((_, suffix)) if !suffix.is_empty() => suffix.to_string(),
                _ => resolved,
            }
        }
    };

    let matched = match_locale_charset(registry, &charset_name).context(UnknownCharsetSnafu {
        charset: charset_name.clone(),
    })?;

    let g = matched
        .g
        .map(|name| name.map(|n| registry.get_by_name(&n)));
    let other = matched.other.map(|n| registry.get_by_name(n));

    Ok(ResolvedLocale {
        charset: charset_name,
        gl: matched.gl,
        gr: matched.gr,
        g,
        other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_rows_are_found_with_spelling_variants() {
        assert!(find_locale_charset_row("iso8859-1").is_some());
        assert!(find_locale_charset_row("ISO88591").is_some());
        assert!(find_locale_charset_row("ISO8859-99").is_none());

        let rewritten = fuzzy_strip_prefix("ISO-8859-5", "ISO-").unwrap();
        assert_eq!(rewritten, "8859-5");
        assert!(fuzzy_strip_prefix("ISO-", "ISO-").is_none());
        assert_eq!(fuzzy_strip_prefix("ibm-cp866", "IBM-CP"), Some("866"));
        assert_eq!(fuzzy_strip_prefix("MICROSOFTCP1251", "MICROSOFT-CP"), Some("1251"));
    }

    #[test]
    fn composite_parts_of_euc_jp() {
        assert_eq!(composite_charset("jisx0208.1990-0"), Some("eucJP"));
        let part = composite_part("eucJP", 2).unwrap();
        assert_eq!(part.name, "JIS X 0201:GR");
        assert_eq!(part.shift, 0x80);
        assert!(composite_part("eucJP", 0).is_some_and(|fc| fc.name == "ASCII"));
        assert!(composite_part("UTF-8", 1).is_none());
    }

    #[test]
    fn encoding_suffix_detection() {
        assert!(has_encoding("ja_JP.eucJP"));
        assert!(!has_encoding("ja_JP"));
        assert!(!has_encoding(".eucJP"));
        assert!(!has_encoding("a.b.c"));
    }
}
