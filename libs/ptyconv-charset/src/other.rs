//! The non-ISO-2022 multibyte codecs.
//!
//! These encodings ignore the ISO 2022 designation machinery; each keeps
//! a small parser state for incomplete multibyte sequences instead. The
//! state belongs to the pump direction using the codec, never to the
//! shared charset record.

pub mod gb18030;
pub mod gbk;
pub mod hkscs;
pub mod sjis;
pub mod utf8;

use crate::{backend::Backends, charset::fuzzy_eq};

/// Result of feeding one byte to a codec parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The byte starts or continues a multibyte sequence.
    NeedMore,
    /// A complete character arrived; the raw charset code.
    Code(u32),
    /// The byte cannot belong to any valid sequence.
    Invalid,
}

/// A non-ISO-2022 codec with its mappings.
pub enum OtherCodec {
    Utf8,
    Gbk(gbk::Gbk),
    Sjis(sjis::Sjis),
    Hkscs(hkscs::Hkscs),
    Gb18030(gb18030::Gb18030),
}

/// Per-direction parser state, zeroed by [OtherCodec::init_state].
pub enum OtherState {
    Utf8(utf8::State),
    /// A pending lead byte for the two-byte codecs.
    Lead(Option<u8>),
    Gb18030(gb18030::State),
}

impl OtherCodec {
    pub fn name(&self) -> &'static str {
        match self {
            OtherCodec::Utf8 => "UTF-8",
            OtherCodec::Gbk(_) => "GBK",
            OtherCodec::Sjis(_) => "SJIS",
            OtherCodec::Hkscs(_) => "BIG5-HKSCS",
            OtherCodec::Gb18030(_) => "GB18030",
        }
    }

    pub fn init_state(&self) -> OtherState {
        match self {
            OtherCodec::Utf8 => OtherState::Utf8(utf8::State::default()),
            OtherCodec::Gb18030(_) => OtherState::Gb18030(gb18030::State::default()),
            _ => OtherState::Lead(None),
        }
    }

    /// Advances the parser with one byte.
    pub fn push_byte(&self, state: &mut OtherState, byte: u8) -> Step {
        match (self, state) {
            (OtherCodec::Utf8, OtherState::Utf8(state)) => utf8::push(state, byte),
            (OtherCodec::Gbk(_), OtherState::Lead(lead)) => gbk::push(lead, byte),
            (OtherCodec::Sjis(_), OtherState::Lead(lead)) => sjis::push(lead, byte),
            (OtherCodec::Hkscs(_), OtherState::Lead(lead)) => hkscs::push(lead, byte),
            (OtherCodec::Gb18030(_), OtherState::Gb18030(state)) => gb18030::push(state, byte),
            _ => Step::Invalid,
        }
    }

    /// Raw charset code to Unicode.
    pub fn forward(&self, code: u32) -> Option<u32> {
        match self {
            OtherCodec::Utf8 => Some(code),
            OtherCodec::Gbk(codec) => codec.forward(code),
            OtherCodec::Sjis(codec) => codec.forward(code),
            OtherCodec::Hkscs(codec) => codec.forward(code),
            OtherCodec::Gb18030(codec) => codec.forward(code),
        }
    }

    /// Unicode back to a raw charset code.
    pub fn reverse(&self, ucs: u32) -> Option<u32> {
        match self {
            OtherCodec::Utf8 => char::from_u32(ucs).map(|c| c as u32),
            OtherCodec::Gbk(codec) => codec.reverse(ucs),
            OtherCodec::Sjis(codec) => codec.reverse(ucs),
            OtherCodec::Hkscs(codec) => codec.reverse(ucs),
            OtherCodec::Gb18030(codec) => codec.reverse(ucs),
        }
    }

    /// Serialises a code from [reverse](Self::reverse) into bytes.
    pub fn emit_code(&self, code: u32, out: &mut Vec<u8>) {
        match self {
            OtherCodec::Utf8 => {
                if let Some(c) = char::from_u32(code) {
                    let mut buffer = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
                }
            }
            OtherCodec::Gb18030(_) => gb18030::emit(code, out),
            _ => {
                if code > 0xFF {
                    out.push((code >> 8) as u8);
                }
                out.push(code as u8);
            }
        }
    }
}

type OpenFn = fn(&mut Backends) -> Option<OtherCodec>;

static OTHER_CHARSETS: [(&str, OpenFn); 5] = [
    ("GBK", gbk::open),
    ("UTF-8", utf8::open),
    ("SJIS", sjis::open),
    ("BIG5-HKSCS", hkscs::open),
    ("GB18030", gb18030::open),
];

/// True when the name refers to a non-ISO-2022 encoding. `Big5` and
/// `JOHAB` count: their two-byte codes are indexed raw, not EUC-style.
pub fn is_other_charset(name: &str) -> bool {
    OTHER_CHARSETS.iter().any(|&(n, _)| fuzzy_eq(n, name))
        || fuzzy_eq(name, "Big5")
        || fuzzy_eq(name, "JOHAB")
}

/// Instantiates the codec registered under `name`.
pub fn open(name: &str, backends: &mut Backends) -> Option<(&'static str, OtherCodec)> {
    let (codec_name, open_fn) = OTHER_CHARSETS
        .iter()
        .copied()
        .find(|&(n, _)| fuzzy_eq(n, name))?;
    open_fn(backends).map(|codec| (codec_name, codec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_names_are_recognised() {
        assert!(is_other_charset("utf8"));
        assert!(is_other_charset("Big5-HKSCS"));
        assert!(is_other_charset("BIG-5"));
        assert!(is_other_charset("johab"));
        assert!(!is_other_charset("eucJP"));
        assert!(!is_other_charset("ISO 8859-1"));
    }
}
