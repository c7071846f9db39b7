#![cfg_attr(rustfmt, rustfmt_skip)]
//! Table for ISO/IEC 8859-9 (Latin 5, Turkish)
//!
//! Latin 5 is Latin 1 with six Icelandic letters replaced by Turkish ones.

use super::identity;

static OVERRIDES: [(u8, u16); 6] = [
    (0xD0, 0x011E), // G with breve
    (0xDD, 0x0130), // I with dot above
    (0xDE, 0x015E), // S with cedilla
    (0xF0, 0x011F), // g with breve
    (0xFD, 0x0131), // dotless i
    (0xFE, 0x015F), // s with cedilla
];

pub fn table() -> Vec<u32> {
    let mut table = identity();
    for &(code, ucs) in OVERRIDES.iter() {
        table[code as usize] = ucs as u32;
    }
    table
}
