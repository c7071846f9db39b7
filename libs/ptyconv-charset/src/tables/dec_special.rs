#![cfg_attr(rustfmt, rustfmt_skip)]
//! Table for the DEC Special Graphics (VT100 line drawing) set

use crate::mapping::MAX8;

static GRAPHICS: [u16; 32] = [
    0x00A0, 0x25C6, 0x2592, 0x2409, 0x240C, 0x240D, 0x240A, 0x00B0,
    0x00B1, 0x2424, 0x240B, 0x2518, 0x2510, 0x250C, 0x2514, 0x253C,
    0x23BA, 0x23BB, 0x2500, 0x23BC, 0x23BD, 0x251C, 0x2524, 0x2534,
    0x252C, 0x2502, 0x2264, 0x2265, 0x03C0, 0x2260, 0x00A3, 0x00B7,
];

pub fn table() -> Vec<u32> {
    let mut table = vec![0u32; MAX8];
    for code in 0..=0x5E_u32 {
        table[code as usize] = code;
    }
    // 0x5F..=0x7E are the graphics positions
    for (index, &ucs) in GRAPHICS.iter().enumerate() {
        table[0x5F + index] = ucs as u32;
    }
    table
}
