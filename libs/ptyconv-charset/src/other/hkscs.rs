//! Big5-HKSCS: lead `0xA1..=0xFE`, trail `0x40..=0x7E` or `0xA1..=0xFE`.

use super::{OtherCodec, Step};
use crate::{
    backend::{BackendMask, Backends},
    mapping::{MapSize, Mapping},
};
use std::rc::Rc;

pub struct Hkscs {
    mapping: Rc<Mapping>,
}

pub fn open(backends: &mut Backends) -> Option<OtherCodec> {
    let mapping = backends.lookup("big5hkscs-0", BackendMask::ANY, MapSize::Bits16)?;
    Some(OtherCodec::Hkscs(Hkscs { mapping }))
}

pub fn push(lead: &mut Option<u8>, byte: u8) -> Step {
    if let Some(first) = lead.take() {
        return match byte {
            0x40..=0x7E | 0xA1..=0xFE => Step::Code(((first as u32) << 8) | byte as u32),
            _ => Step::Invalid,
        };
    }
    match byte {
        0x00..=0x7F => Step::Code(byte as u32),
        0xA1..=0xFE => {
            *lead = Some(byte);
            Step::NeedMore
        }
        _ => Step::Invalid,
    }
}

impl Hkscs {
    pub fn forward(&self, code: u32) -> Option<u32> {
        if code < 0x80 {
            return Some(code);
        }
        self.mapping.forward(code)
    }

    pub fn reverse(&self, ucs: u32) -> Option<u32> {
        if ucs < 0x80 {
            return Some(ucs);
        }
        self.mapping.reverse(ucs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_ranges_have_a_gap() {
        let mut lead = None;
        assert_eq!(push(&mut lead, 0xA4), Step::NeedMore);
        assert_eq!(push(&mut lead, 0x40), Step::Code(0xA440));
        assert_eq!(push(&mut lead, 0xA4), Step::NeedMore);
        assert_eq!(push(&mut lead, 0x7F), Step::Invalid);
        assert_eq!(push(&mut lead, 0xA4), Step::NeedMore);
        assert_eq!(push(&mut lead, 0x90), Step::Invalid);
    }
}
