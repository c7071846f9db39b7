//! Mappings derived from the host's character-conversion library.
//!
//! iconv exposes no table introspection, so the tables are built by
//! running codes through it: every byte `0..=255` for single-byte
//! encodings, every BMP code point (minus the surrogates) for multi-byte
//! ones. Two-byte results are decoded EUC-style; an initial `SS2`/`SS3`
//! selects the G2/G3 part of a composite encoding such as EUC-JP.

use crate::{
    charset::CharsetKind,
    locale,
    mapping::{MapSize, Mapping, MappingCache, MAX16, MAX8},
    other,
};
use std::ffi::CString;
use std::rc::Rc;
use tracing::{debug, trace};

mod ffi {
    //! Foreign Function Interface to system iconv
    use std::os::raw::{c_char, c_int, c_void};

    #[allow(non_camel_case_types)]
    pub type iconv_t = *mut c_void;

    #[cfg(not(target_os = "linux"))]
    #[link(name = "iconv")]
    extern "C" {}

    extern "C" {
        pub fn iconv_open(tocode: *const c_char, fromcode: *const c_char) -> iconv_t;
        pub fn iconv(
            cd: iconv_t,
            inbuf: *mut *const c_char,
            inbytesleft: *mut usize,
            outbuf: *mut *mut c_char,
            outbytesleft: *mut usize,
        ) -> usize;
        pub fn iconv_close(cd: iconv_t) -> c_int;
    }
}

/// An open iconv descriptor.
pub struct Converter {
    cd: ffi::iconv_t,
}

impl Converter {
    pub fn open(to: &str, from: &str) -> Option<Self> {
        let to = CString::new(to).ok()?;
        let from = CString::new(from).ok()?;
        let cd = unsafe { ffi::iconv_open(to.as_ptr(), from.as_ptr()) };
        if cd as isize == -1 {
            None
        } else {
            Some(Self { cd })
        }
    }

    /// Converts one complete unit; fails unless the whole input is
    /// consumed. The shift state is reset before each call.
    pub fn convert(&self, input: &[u8], output: &mut [u8]) -> Option<usize> {
        unsafe {
            ffi::iconv(
                self.cd,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
        }
        let mut src_ptr = input.as_ptr() as *const std::os::raw::c_char;
        let mut src_left = input.len();
        let mut dst_ptr = output.as_mut_ptr() as *mut std::os::raw::c_char;
        let mut dst_left = output.len();
        let rc = unsafe {
            ffi::iconv(
                self.cd,
                &mut src_ptr,
                &mut src_left,
                &mut dst_ptr,
                &mut dst_left,
            )
        };
        if rc as isize == -1 || src_left != 0 {
            None
        } else {
            Some(output.len() - dst_left)
        }
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        unsafe {
            ffi::iconv_close(self.cd);
        }
    }
}

/// Known renamings from the X-style encoding names to names iconv is more
/// likely to accept.
#[rustfmt::skip]
static ENCODING_ALIASES: [(&str, &str); 19] = [
    // 8-bit character sets
    ("KOI8-E",           "ISO-IR-111"),
    ("TCVN-0",           "TCVN5712-1:1993"),
    ("ibm-cp437",        "cp437"),
    ("ibm-cp850",        "cp850"),
    ("ibm-cp866",        "cp866"),
    ("iso646.1973-0",    "US-ASCII"),
    ("ISO 646 (1973)",   "US-ASCII"),
    ("microsoft-cp1250", "windows-1250"),
    ("microsoft-cp1251", "windows-1251"),
    ("microsoft-cp1252", "windows-1252"),
    ("microsoft-cp1254", "windows-1254"),
    ("microsoft-cp1257", "windows-1257"),
    // EUC aliases
    ("ksx1001.1997-0",   "eucKR"),
    ("ksxjohab-1",       "JOHAB"),
    // other (non-ISO-2022) character sets
    ("gb2312.1980-0",    "GB2312"),
    ("big5.eten-0",      "BIG-5"),
    ("big5hkscs-0",      "BIG5-HKSCS"),
    ("gbk-0",            "GBK"),
    ("gb18030.2000-0",   "GB18030"),
];

pub fn find_encoding_alias(name: &str) -> Option<&'static str> {
    ENCODING_ALIASES
        .iter()
        .find(|(from, _)| crate::charset::fuzzy_eq(from, name))
        .map(|&(_, to)| to)
}

/// Removes the first space or dash sitting between a letter and a digit
/// ("ISO 8859-5" never works, "ISO8859-5" might).
fn remove_delimiter(name: &str) -> String {
    let bytes = name.as_bytes();
    for (index, &c) in bytes.iter().enumerate() {
        if c == b' ' || c == b'-' {
            if index > 0
                && index + 1 < bytes.len()
                && bytes[index - 1].is_ascii_alphabetic()
                && bytes[index + 1].is_ascii_digit()
            {
                let mut out = String::with_capacity(name.len() - 1);
                out.push_str(&name[..index]);
                out.push_str(&name[index + 1..]);
                return out;
            }
            break;
        }
    }
    name.to_string()
}

/// Inserts a dash at the first letter/digit boundary, unless the name
/// already contains one earlier.
fn insert_dash(name: &str) -> String {
    let bytes = name.as_bytes();
    for (index, &c) in bytes.iter().enumerate() {
        if c == b'-' {
            break;
        }
        if index + 1 < bytes.len() && c.is_ascii_alphabetic() && bytes[index + 1].is_ascii_digit() {
            let mut out = String::with_capacity(name.len() + 1);
            out.push_str(&name[..=index]);
            out.push('-');
            out.push_str(&name[index + 1..]);
            return out;
        }
    }
    name.to_string()
}

fn dash_to_space(name: &str) -> String {
    name.replacen('-', " ", 1)
}

/// Tries to open a conversion into UTF-8 under the given name, permuting
/// case and punctuation until iconv accepts one. Returns the converter and
/// the name that worked.
pub fn try_open(guess: &str) -> Option<(Converter, String)> {
    for case in 0..3 {
        let cased = match case {
            0 => guess.to_string(),
            1 => guess.to_ascii_uppercase(),
            _ => guess.to_ascii_lowercase(),
        };
        for punct in 0..4 {
            let candidate = match punct {
                0 => cased.clone(),
                1 => remove_delimiter(&cased),
                2 => insert_dash(&cased),
                _ => dash_to_space(&cased),
            };
            if let Some(conv) = Converter::open("UTF-8", &candidate) {
                if candidate != guess {
                    trace!("iconv accepted '{}' for '{}'", candidate, guess);
                }
                return Some((conv, candidate));
            }
        }
    }
    None
}

fn first_code_point(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes)
        .ok()?
        .chars()
        .next()
        .map(|c| c as u32)
}

fn encode_utf8(ucs: u32, buffer: &mut [u8; 4]) -> Option<&[u8]> {
    let c = char::from_u32(ucs)?;
    Some(c.encode_utf8(buffer).as_bytes())
}

/// Counts the codes `0..=255` that convert into UTF-8; 256 means the
/// encoding is certainly single-byte.
fn count_8bit(conv: &Converter) -> u32 {
    let mut output = [0u8; 8];
    (0u32..MAX8 as u32)
        .filter(|&n| conv.convert(&[n as u8], &mut output).is_some())
        .count() as u32
}

/// Probes the table size of an encoding by converting the BMP into it and
/// counting the successes.
fn table_size_of(name: &str) -> usize {
    let Some(conv) = Converter::open(name, "UTF-8")
        else {
            return MAX8;
        };
    let mut total = 0u32;
    let mut input = [0u8; 4];
    let mut output = [0u8; 8];
    for n in bmp_code_points() {
        let Some(bytes) = encode_utf8(n, &mut input)
            else {
                continue;
            };
        if conv.convert(bytes, &mut output).is_some() {
            total += 1;
        }
    }
    debug!("probed {name}: {total} codes");
    if total > 256 {
        MAX16
    } else {
        MAX8
    }
}

fn bmp_code_points() -> impl Iterator<Item = u32> {
    (1..MAX16 as u32).filter(|&n| !(0xD800..=0xDFFF).contains(&n))
}

/// Builds the forward table of a single-byte encoding from an open
/// `encoding -> UTF-8` converter.
fn initialize_8bit(conv: &Converter) -> Vec<u32> {
    let mut forward = vec![0u32; MAX8];
    let mut output = [0u8; 8];
    for n in 0..MAX8 as u32 {
        if let Some(produced) = conv.convert(&[n as u8], &mut output) {
            if let Some(ucs) = first_code_point(&output[..produced]) {
                forward[n as usize] = ucs;
            }
        }
    }
    forward
}

const SS2: u8 = 0x8E;
const SS3: u8 = 0x8F;

/// Interprets one converted byte sequence as a (shift, code) pair.
///
/// `SS2`/`SS3` prefixes select G2/G3; otherwise the high bit of the lead
/// byte selects G1. Two-byte EUC codes are folded into `0x20..0x7F`
/// columns by toggling the high bits.
fn dbcs_decode(buffer: &[u8], euc: bool) -> (usize, u32) {
    let first = buffer[0];
    let gs = match first {
        SS2 => {
            if buffer.len() > 1 {
                2
            } else {
                1
            }
        }
        SS3 => {
            if buffer.len() > 1 {
                3
            } else {
                1
            }
        }
        _ => usize::from(first >= 0x80),
    };
    let body = if gs == 2 || gs == 3 {
        &buffer[1..]
    } else {
        buffer
    };
    let code = match body.len() {
        0 => first as u32,
        1 => body[0] as u32,
        _ => {
            let code = ((body[0] as u32) << 8) | body[1] as u32;
            if euc {
                code ^ 0x8080
            } else {
                code
            }
        }
    };
    (gs, code)
}

/// Enumerates the BMP through `UTF-8 -> name` and distributes the results
/// over up to four part tables by shift. Used both for plain double-byte
/// encodings (one part) and for composites such as EUC-JP.
fn initialize_16bit(name: &str, parts: &mut [Option<Vec<u32>>], euc: bool) -> bool {
    let Some(conv) = Converter::open(name, "UTF-8")
        else {
            return false;
        };
    let mut input = [0u8; 4];
    let mut output = [0u8; 8];
    for n in bmp_code_points() {
        let Some(bytes) = encode_utf8(n, &mut input)
            else {
                continue;
            };
        let Some(produced) = conv.convert(bytes, &mut output)
            else {
                continue;
            };
        let result = &output[..produced];
        if result.is_empty() || (result.len() > 2 && result[0] != SS2 && result[0] != SS3) {
            continue;
        }
        let (gs, code) = dbcs_decode(result, euc);
        let slot = if gs >= parts.len() {
            if gs == 1 {
                0
            } else {
                continue;
            }
        } else {
            gs
        };
        let Some(table) = parts.get_mut(slot).and_then(|p| p.as_mut())
            else {
                continue;
            };
        if (code as usize) < table.len() {
            table[code as usize] = n;
        }
    }
    true
}

/// Loads a composite encoding (canonically EUC-JP) and registers each
/// part under its charset name.
fn load_composite(cache: &mut MappingCache, composite: &str) -> bool {
    let Some((_, actual)) = try_open(composite)
        else {
            return false;
        };

    let mut names: [Option<&'static str>; 4] = [None; 4];
    let mut parts: [Option<Vec<u32>>; 4] = [None, None, None, None];
    for g in 0..4 {
        let Some(fc) = locale::composite_part(composite, g)
            else {
                continue;
            };
        // ASCII needs no table
        if fc.name == "ASCII" {
            continue;
        }
        let size = match fc.kind {
            CharsetKind::Code94 | CharsetKind::Code96 | CharsetKind::Code128 => MAX8,
            _ => MAX16,
        };
        debug!("composite {composite} part {g}: {} ({})", fc.name, fc.xlfd);
        names[g] = Some(fc.name);
        parts[g] = Some(vec![0u32; size]);
    }

    if !initialize_16bit(&actual, &mut parts, !other::is_other_charset(composite)) {
        return false;
    }

    let mut loaded = false;
    for g in 0..4 {
        if let (Some(name), Some(table)) = (names[g], parts[g].take()) {
            cache.insert(Mapping::from_forward(name, table));
            loaded = true;
        }
    }
    loaded
}

/// The iconv backend entry point.
pub fn lookup(cache: &mut MappingCache, name: &str, size: MapSize) -> Option<Rc<Mapping>> {
    let mut opened = try_open(name);
    if opened.is_none() {
        if let Some(alias) = find_encoding_alias(name) {
            debug!("retrying '{}' as '{}'", name, alias);
            opened = try_open(alias);
        }
    }

    if let Some((conv, actual)) = opened {
        let table_size = match size.table_size() {
            Some(explicit) => explicit,
            None => {
                if count_8bit(&conv) < 256 {
                    table_size_of(&actual)
                } else {
                    MAX8
                }
            }
        };
        let forward = if table_size == MAX8 {
            initialize_8bit(&conv)
        } else {
            let mut parts = [Some(vec![0u32; MAX16])];
            if !initialize_16bit(&actual, &mut parts, !other::is_other_charset(&actual)) {
                return None;
            }
            parts[0].take().unwrap()
        };
        return Some(cache.insert(Mapping::from_forward(name, forward)));
    }

    // The encoding may be one part of a composite the library does know,
    // e.g. jisx0208 inside EUC-JP.
    let fc = crate::charset::fontenc_by_name(name)?;
    let composite = locale::composite_charset(name)?;
    if let Some(found) = cache.find(fc.name) {
        return Some(found);
    }
    if !load_composite(cache, composite) {
        return None;
    }
    cache.find(fc.name)
}

/// Builds the GB18030 mapping pair: the GBK-compatible two-byte plane and
/// the four-byte plane keyed by its linear pointer. The supplementary
/// planes above the BMP are purely arithmetic and need no table.
pub fn gb18030_parts(cache: &mut MappingCache) -> Option<(Rc<Mapping>, Rc<Mapping>)> {
    if let (Some(two), Some(four)) = (
        cache.find("gb18030.2000-0"),
        cache.find("gb18030.2000-1"),
    ) {
        return Some((two, four));
    }

    let (_, actual) = try_open("GB18030")?;
    let conv = Converter::open(&actual, "UTF-8")?;
    let mut two = vec![0u32; MAX16];
    let mut four = vec![0u32; MAX16];
    let mut input = [0u8; 4];
    let mut output = [0u8; 8];
    for n in bmp_code_points() {
        let Some(bytes) = encode_utf8(n, &mut input)
            else {
                continue;
            };
        let Some(produced) = conv.convert(bytes, &mut output)
            else {
                continue;
            };
        match &output[..produced] {
            [b] if *b < 0x80 => two[*b as usize] = n,
            [hi, lo] => two[((*hi as usize) << 8) | *lo as usize] = n,
            [b1, b2, b3, b4] => {
                let pointer = (((*b1 as u32 - 0x81) * 10 + (*b2 as u32 - 0x30)) * 126
                    + (*b3 as u32 - 0x81))
                    * 10
                    + (*b4 as u32 - 0x30);
                if (pointer as usize) < MAX16 {
                    four[pointer as usize] = n;
                }
            }
            _ => {}
        }
    }

    let two = cache.insert(Mapping::from_forward("gb18030.2000-0", two));
    let four = cache.insert(Mapping::from_forward("gb18030.2000-1", four));
    Some((two, four))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_permutations() {
        assert_eq!(remove_delimiter("ISO 8859-5"), "ISO8859-5");
        assert_eq!(remove_delimiter("CP 866"), "CP866");
        assert_eq!(remove_delimiter("KOI8-R"), "KOI8-R");
        assert_eq!(insert_dash("ISO8859-5"), "ISO-8859-5");
        assert_eq!(insert_dash("KOI8-R"), "KOI8-R");
        assert_eq!(dash_to_space("KOI8-R"), "KOI8 R");
    }

    #[test]
    fn big5_and_johab_resolve_to_their_qualified_forms() {
        // The registry and the alias table historically disagreed about
        // these two; they must stay plain synonyms.
        assert_eq!(find_encoding_alias("big5.eten-0"), Some("BIG-5"));
        assert_eq!(find_encoding_alias("Big5 eten 0"), Some("BIG-5"));
        assert_eq!(find_encoding_alias("ksxjohab-1"), Some("JOHAB"));
    }

    #[test]
    fn dbcs_decoding_recognises_shifts() {
        // plain EUC two-byte: high bits folded away
        assert_eq!(dbcs_decode(&[0xA4, 0xA2], true), (1, 0x2422));
        // raw two-byte for the non-EUC encodings
        assert_eq!(dbcs_decode(&[0xA4, 0xA2], false), (1, 0xA4A2));
        // SS2 selects G2, the remaining byte is the code
        assert_eq!(dbcs_decode(&[SS2, 0xB1], true), (2, 0xB1));
        // SS3 selects G3 with a two-byte code
        assert_eq!(dbcs_decode(&[SS3, 0xA1, 0xA1], true), (3, 0x2121));
        // single ASCII byte
        assert_eq!(dbcs_decode(&[0x41], true), (0, 0x41));
    }

    #[test]
    fn iconv_latin1_table_when_available() {
        // Probing permutations should find ISO 8859-1 under any libc.
        let Some((conv, _)) = try_open("ISO 8859-1")
            else {
                return;
            };
        let forward = initialize_8bit(&conv);
        assert_eq!(forward[0x41], 0x41);
        assert_eq!(forward[0xE9], 0xE9);
    }
}
