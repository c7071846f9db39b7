//! Shift-JIS: JIS X 0201 single bytes plus JIS X 0208 double bytes with
//! lead ranges `0x81..=0x9F` and `0xE0..=0xFC`.
//!
//! The two sub-mappings are owned independently; double-byte codes are
//! converted between the Shift-JIS and JIS row/cell numberings.

use super::{OtherCodec, Step};
use crate::{
    backend::{BackendMask, Backends},
    mapping::{MapSize, Mapping},
};
use std::rc::Rc;

pub struct Sjis {
    x0201: Rc<Mapping>,
    x0208: Rc<Mapping>,
}

pub fn open(backends: &mut Backends) -> Option<OtherCodec> {
    let x0208 = backends.lookup("jisx0208.1990-0", BackendMask::ANY, MapSize::Bits16)?;
    let x0201 = backends.lookup("jisx0201.1976-0", BackendMask::ANY, MapSize::Bits8)?;
    Some(OtherCodec::Sjis(Sjis { x0201, x0208 }))
}

pub fn push(lead: &mut Option<u8>, byte: u8) -> Step {
    if let Some(first) = lead.take() {
        return match byte {
            0x40..=0xFC if byte != 0x7F => Step::Code(((first as u32) << 8) | byte as u32),
            _ => Step::Invalid,
        };
    }
    match byte {
        0x00..=0x7F | 0xA1..=0xDF => Step::Code(byte as u32),
        0x81..=0x9F | 0xE0..=0xFC => {
            *lead = Some(byte);
            Step::NeedMore
        }
        _ => Step::Invalid,
    }
}

/// Shift-JIS double-byte code to the JIS `0x2121`-based code.
fn sjis_to_jis(code: u32) -> u32 {
    let s1 = code >> 8;
    let s2 = code & 0xFF;
    let row_pair = if s1 <= 0x9F { s1 - 0x81 } else { s1 - 0xC1 };
    let (row, cell) = if s2 >= 0x9F {
        (row_pair * 2 + 2, s2 - 0x9E)
    } else {
        let cell = s2 - if s2 >= 0x80 { 0x40 } else { 0x3F };
        (row_pair * 2 + 1, cell)
    };
    ((row + 0x20) << 8) | (cell + 0x20)
}

/// JIS `0x2121`-based code to the Shift-JIS double-byte code.
fn jis_to_sjis(code: u32) -> u32 {
    let row = (code >> 8) - 0x20;
    let cell = (code & 0xFF) - 0x20;
    let s1 = if row <= 62 {
        (row - 1) / 2 + 0x81
    } else {
        (row - 1) / 2 + 0xC1
    };
    let s2 = if row % 2 == 1 {
        let s2 = cell + 0x3F;
        if s2 >= 0x7F {
            s2 + 1
        } else {
            s2
        }
    } else {
        cell + 0x9E
    };
    (s1 << 8) | s2
}

impl Sjis {
    pub fn forward(&self, code: u32) -> Option<u32> {
        if code <= 0xFF {
            self.x0201.forward(code)
        } else {
            self.x0208.forward(sjis_to_jis(code))
        }
    }

    pub fn reverse(&self, ucs: u32) -> Option<u32> {
        if let Some(code) = self.x0201.reverse(ucs) {
            if code <= 0xFF {
                return Some(code);
            }
        }
        self.x0208.reverse(ucs).map(jis_to_sjis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_numbering_conversions() {
        // HIRAGANA LETTER A: JIS 0x2422, Shift-JIS 0x82A0
        assert_eq!(sjis_to_jis(0x82A0), 0x2422);
        assert_eq!(jis_to_sjis(0x2422), 0x82A0);
        // IDEOGRAPHIC SPACE: JIS 0x2121, Shift-JIS 0x8140
        assert_eq!(sjis_to_jis(0x8140), 0x2121);
        assert_eq!(jis_to_sjis(0x2121), 0x8140);
        // row 63 is the first in the second lead range
        assert_eq!(jis_to_sjis(0x5F21), 0xE040);
        assert_eq!(sjis_to_jis(0xE040), 0x5F21);
    }

    #[test]
    fn conversion_is_a_bijection_over_the_grid() {
        for row in 1..=94u32 {
            for cell in 1..=94u32 {
                let jis = ((row + 0x20) << 8) | (cell + 0x20);
                assert_eq!(sjis_to_jis(jis_to_sjis(jis)), jis);
            }
        }
    }

    #[test]
    fn half_width_katakana_is_single_byte() {
        let mut lead = None;
        assert_eq!(push(&mut lead, 0xB1), Step::Code(0xB1));
        assert_eq!(push(&mut lead, 0x82), Step::NeedMore);
        assert_eq!(push(&mut lead, 0xA0), Step::Code(0x82A0));
    }
}
