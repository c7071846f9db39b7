//! GBK: lead `0x81..=0xFE`, trail `0x40..=0xFE` excluding `0x7F`.

use super::{OtherCodec, Step};
use crate::{
    backend::{BackendMask, Backends},
    mapping::{MapSize, Mapping},
};
use std::rc::Rc;

pub struct Gbk {
    mapping: Rc<Mapping>,
}

pub fn open(backends: &mut Backends) -> Option<OtherCodec> {
    let mapping = backends.lookup("gbk-0", BackendMask::ANY, MapSize::Bits16)?;
    Some(OtherCodec::Gbk(Gbk { mapping }))
}

pub fn push(lead: &mut Option<u8>, byte: u8) -> Step {
    if let Some(first) = lead.take() {
        return match byte {
            0x40..=0xFE if byte != 0x7F => Step::Code(((first as u32) << 8) | byte as u32),
            _ => Step::Invalid,
        };
    }
    match byte {
        0x00..=0x7F => Step::Code(byte as u32),
        0x81..=0xFE => {
            *lead = Some(byte);
            Step::NeedMore
        }
        _ => Step::Invalid,
    }
}

impl Gbk {
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
    fn lead_and_trail_ranges() {
        let mut lead = None;
        assert_eq!(push(&mut lead, 0x41), Step::Code(0x41));
        assert_eq!(push(&mut lead, 0xB0), Step::NeedMore);
        assert_eq!(push(&mut lead, 0xA1), Step::Code(0xB0A1));
        assert_eq!(push(&mut lead, 0xB0), Step::NeedMore);
        assert_eq!(push(&mut lead, 0x7F), Step::Invalid);
        assert_eq!(push(&mut lead, 0x80), Step::Invalid);
        assert_eq!(push(&mut lead, 0xFF), Step::Invalid);
    }
}
