use bitflags::bitflags;
use ptyconv_charset::{
    other::{utf8, OtherCodec, OtherState, Step},
    Charset, CharsetKind, Charsets,
};
use std::rc::Rc;
use tracing::trace;

pub(crate) const ESC: u8 = 0x1B;
const SO: u8 = 0x0E;
const SI: u8 = 0x0F;
const SS2: u8 = 0x8E;
const SS3: u8 = 0x8F;
const DEL: u8 = 0x7F;

/// Escape sequences longer than this cannot be designations or shifts;
/// give up buffering and let them through.
const MAX_ESC: usize = 16;

bitflags! {
    /// Behaviour of the input (user to child) direction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InputFlags: u8 {
        /// Emit GR codes as bytes with the high bit set.
        const EIGHT_BIT = 1 << 0;
        /// Generate single shifts for G2/G3 codes.
        const SS = 1 << 1;
        /// Emit the code in GR form after a single shift.
        const SS_GR = 1 << 2;
        /// Generate locking shifts when single shifts do not apply.
        const LS = 1 << 3;
    }
}

bitflags! {
    /// Which sequence classes the output (child to user) direction
    /// interprets; disabled classes pass through to the terminal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutputFlags: u8 {
        /// Interpret single shifts.
        const SS = 1 << 0;
        /// Interpret locking shifts.
        const LS = 1 << 1;
        /// Interpret designation sequences.
        const SELECT = 1 << 2;
    }
}

impl Default for InputFlags {
    fn default() -> Self {
        InputFlags::EIGHT_BIT | InputFlags::SS | InputFlags::SS_GR
    }
}

impl Default for OutputFlags {
    fn default() -> Self {
        OutputFlags::all()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Plane {
    Gl,
    Gr,
}

/// One direction of the ISO 2022 pump.
///
/// The state survives arbitrary buffer boundaries: partial escape
/// sequences, partial multibyte characters, and partial UTF-8 input are
/// carried over to the next call.
pub struct Iso2022 {
    g: [Rc<Charset>; 4],
    gl: usize,
    gr: usize,
    single_shift: Option<usize>,
    pub input_flags: InputFlags,
    pub output_flags: OutputFlags,
    other: Option<(Rc<Charset>, OtherState)>,
    /// Escape sequence collected so far, including the ESC itself.
    esc: Vec<u8>,
    /// First byte of a pending multibyte character, with its slot.
    pending: Option<(usize, u8)>,
    /// UTF-8 decoder state for the input direction.
    utf8_in: utf8::State,
}

fn push_ucs(out: &mut Vec<u8>, ucs: u32) {
    if let Some(c) = char::from_u32(ucs) {
        let mut buffer = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
    }
}

impl Iso2022 {
    pub(crate) fn new(
        g: [Rc<Charset>; 4],
        gl: usize,
        gr: usize,
        input_flags: InputFlags,
        output_flags: OutputFlags,
        other: Option<Rc<Charset>>,
    ) -> Self {
        let other = other.and_then(|charset| {
            let state = charset.other_codec()?.init_state();
            Some((charset, state))
        });
        Self {
            g,
            gl,
            gr,
            single_shift: None,
            input_flags,
            output_flags,
            other,
            esc: Vec::new(),
            pending: None,
            utf8_in: utf8::State::default(),
        }
    }

    pub fn g(&self, index: usize) -> &Charset {
        &self.g[index]
    }

    pub fn gl(&self) -> usize {
        self.gl
    }

    pub fn gr(&self) -> usize {
        self.gr
    }

    pub fn other_name(&self) -> Option<&str> {
        self.other.as_ref().map(|(charset, _)| charset.name.as_ref())
    }

    /// Output direction: translates child bytes into UTF-8.
    pub fn decode(&mut self, registry: &mut Charsets, input: &[u8], out: &mut Vec<u8>) {
        if let Some((charset, state)) = self.other.as_mut() {
            let codec = charset.other_codec().expect("other charset has a codec");
            // a UTF-8 session is an identity pipe
            if matches!(codec, OtherCodec::Utf8) {
                out.extend_from_slice(input);
                return;
            }
            for &byte in input {
                if let Step::Code(code) = codec.push_byte(state, byte) {
                    if let Some(ucs) = codec.forward(code) {
                        push_ucs(out, ucs);
                    }
                }
            }
            return;
        }

        for &byte in input {
            self.decode_byte(registry, byte, out);
        }
    }

    fn decode_byte(&mut self, registry: &mut Charsets, byte: u8, out: &mut Vec<u8>) {
        if !self.esc.is_empty() {
            match byte {
                0x20..=0x2F => {
                    self.esc.push(byte);
                    if self.esc.len() > MAX_ESC {
                        out.extend_from_slice(&self.esc);
                        self.esc.clear();
                    }
                }
                0x30..=0x7E => {
                    self.esc.push(byte);
                    self.handle_escape(registry, out);
                    self.esc.clear();
                }
                _ => {
                    // malformed escape: drop it, reprocess the byte
                    self.esc.clear();
                    self.decode_byte(registry, byte, out);
                }
            }
            return;
        }

        match byte {
            ESC => self.esc.push(byte),
            SO if self.output_flags.contains(OutputFlags::LS) => {
                self.pending = None;
                self.gl = 1;
            }
            SI if self.output_flags.contains(OutputFlags::LS) => {
                self.pending = None;
                self.gl = 0;
            }
            SS2 if self.output_flags.contains(OutputFlags::SS) => {
                self.single_shift = Some(2);
            }
            SS3 if self.output_flags.contains(OutputFlags::SS) => {
                self.single_shift = Some(3);
            }
            0x00..=0x1F | DEL => {
                // controls abort any pending multibyte character
                self.pending = None;
                out.push(byte);
            }
            0x80..=0x9F => {
                self.pending = None;
                out.push(byte);
            }
            _ => self.graphic_byte(byte, out),
        }
    }

    fn graphic_byte(&mut self, byte: u8, out: &mut Vec<u8>) {
        if let Some((slot, first)) = self.pending.take() {
            self.complete_multibyte(slot, first, byte, out);
            self.single_shift = None;
            return;
        }

        let plane = if byte < 0x80 { Plane::Gl } else { Plane::Gr };
        let cursor = match plane {
            Plane::Gl => self.gl,
            Plane::Gr => self.gr,
        };
        let slot = self.single_shift.unwrap_or(cursor);
        let charset = self.g[slot].clone();

        let code = (byte & 0x7F) as u32;
        // SPACE and DEL columns are never part of a 94-style set
        let boundary = code == 0x20 || code == 0x7F;

        match charset.kind {
            CharsetKind::Matrix9494 if boundary => {}
            CharsetKind::Matrix9494 | CharsetKind::Matrix9696 => {
                self.pending = Some((slot, byte));
                return;
            }
            CharsetKind::Matrix94192 => {
                // the lead byte of a 94x192 set must be a GR byte
                if (0xA1..=0xFE).contains(&byte) {
                    self.pending = Some((slot, byte));
                } else {
                    self.single_shift = None;
                }
                return;
            }
            _ => {}
        }
        self.single_shift = None;

        match charset.kind {
            CharsetKind::Code94 | CharsetKind::Matrix9494 => {
                if boundary {
                    if plane == Plane::Gl {
                        out.push(byte);
                    }
                    return;
                }
            }
            CharsetKind::Code96 | CharsetKind::Code128 => {}
            _ => return,
        }

        if charset.is_unknown() {
            out.push(byte);
        } else if let Some(ucs) = charset.recode(code) {
            push_ucs(out, ucs);
        }
    }

    fn complete_multibyte(&mut self, slot: usize, first: u8, second: u8, out: &mut Vec<u8>) {
        let charset = self.g[slot].clone();
        let code = match charset.kind {
            CharsetKind::Matrix9494 | CharsetKind::Matrix9696 => {
                (((first & 0x7F) as u32) << 8) | (second & 0x7F) as u32
            }
            CharsetKind::Matrix94192 => {
                if !matches!(second, 0x40..=0x7E | 0xA1..=0xFE) {
                    return;
                }
                (((first & 0x7F) as u32) << 8) | second as u32
            }
            _ => return,
        };

        if charset.is_unknown() {
            out.push(first);
            out.push(second);
        } else if let Some(ucs) = charset.recode(code) {
            push_ucs(out, ucs);
        }
    }

    fn handle_escape(&mut self, registry: &mut Charsets, out: &mut Vec<u8>) {
        if !self.interpret_escape(registry) {
            // not ours (or interpretation disabled): hand it to the
            // terminal unchanged
            out.extend_from_slice(&self.esc);
        }
    }

    fn interpret_escape(&mut self, registry: &mut Charsets) -> bool {
        let (&final_byte, intermediates) = self.esc[1..]
            .split_last()
            .expect("escape buffer holds at least ESC and a final");
        let flags = self.output_flags;

        let designation = match (intermediates, final_byte) {
            ([], b'N') if flags.contains(OutputFlags::SS) => {
                self.single_shift = Some(2);
                return true;
            }
            ([], b'O') if flags.contains(OutputFlags::SS) => {
                self.single_shift = Some(3);
                return true;
            }
            ([], b'n') if flags.contains(OutputFlags::LS) => {
                self.gl = 2;
                return true;
            }
            ([], b'o') if flags.contains(OutputFlags::LS) => {
                self.gl = 3;
                return true;
            }
            ([], b'~') if flags.contains(OutputFlags::LS) => {
                self.gr = 1;
                return true;
            }
            ([], b'}') if flags.contains(OutputFlags::LS) => {
                self.gr = 2;
                return true;
            }
            ([], b'|') if flags.contains(OutputFlags::LS) => {
                self.gr = 3;
                return true;
            }

            ([0x28], f) => Some((0, CharsetKind::Code94, f)),
            ([0x29], f) => Some((1, CharsetKind::Code94, f)),
            ([0x2A], f) => Some((2, CharsetKind::Code94, f)),
            ([0x2B], f) => Some((3, CharsetKind::Code94, f)),
            ([0x2D], f) => Some((1, CharsetKind::Code96, f)),
            ([0x2E], f) => Some((2, CharsetKind::Code96, f)),
            ([0x2F], f) => Some((3, CharsetKind::Code96, f)),
            // the short multibyte form is only valid for the three
            // classic finals
            ([0x24], f @ (b'A' | b'B' | b'C')) => Some((0, CharsetKind::Matrix9494, f)),
            ([0x24, 0x28], f) => Some((0, CharsetKind::Matrix9494, f)),
            ([0x24, 0x29], f) => Some((1, CharsetKind::Matrix9494, f)),
            ([0x24, 0x2A], f) => Some((2, CharsetKind::Matrix9494, f)),
            ([0x24, 0x2B], f) => Some((3, CharsetKind::Matrix9494, f)),
            ([0x24, 0x2D], f) => Some((1, CharsetKind::Matrix9696, f)),
            ([0x24, 0x2E], f) => Some((2, CharsetKind::Matrix9696, f)),
            ([0x24, 0x2F], f) => Some((3, CharsetKind::Matrix9696, f)),
            _ => None,
        };

        match designation {
            Some((slot, kind, f)) if flags.contains(OutputFlags::SELECT) => {
                let charset = registry.get_by_final(f, kind);
                trace!("designating {} into G{slot}", charset.name);
                self.g[slot] = charset;
                true
            }
            _ => false,
        }
    }

    /// Input direction: translates the user's UTF-8 into child bytes.
    pub fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        if let Some((charset, _)) = self.other.as_ref() {
            let codec = charset.other_codec().expect("other charset has a codec");
            if matches!(codec, OtherCodec::Utf8) {
                out.extend_from_slice(input);
                return;
            }
            for &byte in input {
                if let Step::Code(ucs) = utf8::push(&mut self.utf8_in, byte) {
                    if let Some(code) = codec.reverse(ucs) {
                        codec.emit_code(code, out);
                    }
                }
            }
            return;
        }

        for &byte in input {
            if let Step::Code(ucs) = utf8::push(&mut self.utf8_in, byte) {
                self.encode_ucs(ucs, out);
            }
        }
    }

    fn encode_ucs(&mut self, ucs: u32, out: &mut Vec<u8>) {
        // control characters pass through untranslated
        if ucs < 0x20 || (0x7F..0xA0).contains(&ucs) {
            out.push(ucs as u8);
            return;
        }

        // GL slot, GR slot, then the remaining slots
        let mut order = [0usize; 4];
        let mut used = 0;
        for slot in [self.gl, self.gr, 0, 1, 2, 3] {
            if !order[..used].contains(&slot) {
                order[used] = slot;
                used += 1;
            }
        }

        for &slot in &order[..used] {
            if let Some(code) = self.g[slot].reverse(ucs) {
                self.emit_in_slot(slot, code, out);
                return;
            }
        }
        // no designated set can represent the character: drop it
    }

    fn emit_in_slot(&mut self, slot: usize, code: u32, out: &mut Vec<u8>) {
        let flags = self.input_flags;
        let eight_bit = flags.contains(InputFlags::EIGHT_BIT);

        if slot == self.gl {
            self.emit_gl(slot, code, out);
        } else if slot == self.gr && eight_bit {
            self.emit_gr(slot, code, out);
        } else if flags.contains(InputFlags::SS) && (slot == 2 || slot == 3) {
            if eight_bit {
                out.push(if slot == 2 { SS2 } else { SS3 });
            } else {
                out.extend_from_slice(&[ESC, if slot == 2 { b'N' } else { b'O' }]);
            }
            if flags.contains(InputFlags::SS_GR) && eight_bit {
                self.emit_gr(slot, code, out);
            } else {
                self.emit_gl(slot, code, out);
            }
        } else if flags.contains(InputFlags::LS) {
            match slot {
                0 => {
                    out.push(SI);
                    self.gl = 0;
                    self.emit_gl(slot, code, out);
                }
                1 if eight_bit => {
                    out.extend_from_slice(&[ESC, b'~']);
                    self.gr = 1;
                    self.emit_gr(slot, code, out);
                }
                1 => {
                    out.push(SO);
                    self.gl = 1;
                    self.emit_gl(slot, code, out);
                }
                2 | 3 if eight_bit => {
                    out.extend_from_slice(&[ESC, if slot == 2 { b'}' } else { b'|' }]);
                    self.gr = slot;
                    self.emit_gr(slot, code, out);
                }
                _ => {
                    out.extend_from_slice(&[ESC, if slot == 2 { b'n' } else { b'o' }]);
                    self.gl = slot;
                    self.emit_gl(slot, code, out);
                }
            }
        }
        // no way to reach the slot under the current flags: drop
    }

    fn emit_gl(&self, slot: usize, code: u32, out: &mut Vec<u8>) {
        match self.g[slot].kind {
            CharsetKind::Matrix9494 | CharsetKind::Matrix9696 => {
                out.push((code >> 8) as u8 & 0x7F);
                out.push(code as u8 & 0x7F);
            }
            // a 94x192 code cannot be expressed in GL
            CharsetKind::Matrix94192 => {}
            _ => out.push(code as u8 & 0x7F),
        }
    }

    fn emit_gr(&self, slot: usize, code: u32, out: &mut Vec<u8>) {
        match self.g[slot].kind {
            CharsetKind::Matrix9494 | CharsetKind::Matrix9696 => {
                out.push((code >> 8) as u8 | 0x80);
                out.push(code as u8 | 0x80);
            }
            CharsetKind::Matrix94192 => {
                out.push((code >> 8) as u8 | 0x80);
                out.push(code as u8);
            }
            _ => out.push(code as u8 | 0x80),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::PumpBuilder;
    use ptyconv_charset::{locale, Config};

    fn registry() -> Charsets {
        Charsets::new(Rc::new(Config::new()))
    }

    fn builtin_registry() -> Charsets {
        let mut config = Config::new();
        config.set_lookup_order("builtin").unwrap();
        config.lookup_order.truncate(1);
        Charsets::new(Rc::new(config))
    }

    fn pump_for(registry: &mut Charsets, charset: &str) -> Iso2022 {
        // resolve by explicit charset, as `--encoding` would, to keep the
        // tests independent of the host's locale database
        let resolved = locale::resolve_locale_state(registry, "C", Some(charset)).unwrap();
        let mut builder = PumpBuilder::new();
        builder.apply_locale(&resolved);
        builder.build(registry)
    }

    fn decode_all(pump: &mut Iso2022, registry: &mut Charsets, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        pump.decode(registry, input, &mut out);
        out
    }

    fn encode_all(pump: &mut Iso2022, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        pump.encode(input, &mut out);
        out
    }

    #[test]
    fn ascii_is_identity_in_locale_c() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "C");
        assert_eq!(decode_all(&mut pump, &mut reg, b"\x41\x42\x43"), b"ABC");
    }

    #[test]
    fn latin1_output_becomes_utf8() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "ISO8859-1");
        assert_eq!(decode_all(&mut pump, &mut reg, b"\xE9"), b"\xC3\xA9");
    }

    #[test]
    fn latin1_input_becomes_eight_bit() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "ISO8859-1");
        assert_eq!(encode_all(&mut pump, b"\xC3\xA9"), b"\xE9");
    }

    #[test]
    fn seven_bit_input_uses_shifts() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "ISO8859-1");
        pump.input_flags = InputFlags::SS | InputFlags::SS_GR;
        // G2 holds Latin-1: a 7-bit channel must reach it via ESC N and
        // a GL code
        assert_eq!(encode_all(&mut pump, b"\xC3\xA9"), b"\x1BN\x69");
    }

    #[test]
    fn euc_jp_designation_and_decoding() {
        let mut reg = registry();
        // JIS X 0208 comes from the host iconv library; skip where absent
        if reg.get_by_name("JIS X 0208").is_unknown() {
            return;
        }
        let mut pump = pump_for(&mut reg, "eucJP");
        assert_eq!(
            decode_all(&mut pump, &mut reg, b"\x1B\x24\x42\x24\x22"),
            "\u{3042}".as_bytes()
        );
    }

    #[test]
    fn euc_jp_input_prefers_single_shifts() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "eucJP");
        // HALFWIDTH KATAKANA LETTER A lives in G2 (JIS X 0201 upper
        // half): SS2 plus the GR code, not a locking shift
        assert_eq!(
            encode_all(&mut pump, "\u{FF71}".as_bytes()),
            b"\x8E\xB1"
        );
    }

    #[test]
    fn utf8_locale_is_an_identity_pipe() {
        let mut reg = builtin_registry();
        let mut output = pump_for(&mut reg, "UTF-8");
        let mut input = pump_for(&mut reg, "UTF-8");
        let bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(decode_all(&mut output, &mut reg, &bytes), bytes);
        assert_eq!(encode_all(&mut input, &bytes), bytes);
    }

    #[test]
    fn pass_through_degrades_to_identity() {
        let mut reg = builtin_registry();
        // nothing designated: all four slots hold sentinels
        let mut pump = PumpBuilder::new().build(&reg);
        let bytes: Vec<u8> = (0..=255).filter(|&b| b != 0x1B && b != 0x8E && b != 0x8F && b != 0x0E && b != 0x0F).collect();
        assert_eq!(decode_all(&mut pump, &mut reg, &bytes), bytes);
    }

    #[test]
    fn designation_is_idempotent() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "C");
        decode_all(&mut pump, &mut reg, b"\x1B\x2D\x41");
        let once = pump.g(1).name.to_string();
        decode_all(&mut pump, &mut reg, b"\x1B\x2D\x41");
        assert_eq!(pump.g(1).name, once);
        assert_eq!(pump.gl(), 0);
        assert_eq!(pump.gr(), 2);
    }

    #[test]
    fn single_shift_applies_to_one_character_only() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "eucJP");
        // SS2, one katakana byte, then a plain GL byte
        let out = decode_all(&mut pump, &mut reg, b"\x8E\xB1\x41");
        assert_eq!(out, "\u{FF71}A".as_bytes());
    }

    #[test]
    fn unknown_escape_sequences_pass_through() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "ISO8859-1");
        // a CSI colour sequence is none of our business
        assert_eq!(
            decode_all(&mut pump, &mut reg, b"\x1B[1;31mred"),
            b"\x1B[1;31mred"
        );
    }

    #[test]
    fn buffer_boundaries_do_not_matter() {
        let mut reg = builtin_registry();
        let input: &[u8] = b"\x1B\x2D\x4C\xD0\xE0\xD8\xD2\xD5\xE2 A\x1B[0m\xC1";
        let mut whole = pump_for(&mut reg, "C");
        let expected = decode_all(&mut whole, &mut reg, input);

        for split in 0..=input.len() {
            let mut pump = pump_for(&mut reg, "C");
            let mut out = Vec::new();
            pump.decode(&mut reg, &input[..split], &mut out);
            pump.decode(&mut reg, &input[split..], &mut out);
            assert_eq!(out, expected, "split at {split}");
        }
    }

    #[test]
    fn gr_bytes_in_a_94_set_are_dropped() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "C");
        // designate JIS X 0201 upper half (94 codes) into G1, point GR
        // at it, then send the boundary bytes
        decode_all(&mut pump, &mut reg, b"\x1B\x29\x49\x1B~");
        assert_eq!(pump.gr(), 1);
        assert_eq!(decode_all(&mut pump, &mut reg, b"\xA0\xFF"), b"");
        assert_eq!(
            decode_all(&mut pump, &mut reg, b"\xB1"),
            "\u{FF71}".as_bytes()
        );
    }

    #[test]
    fn malformed_utf8_input_is_dropped() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "ISO8859-1");
        // overlong, lone surrogate, out of range; the trailing ASCII
        // survives
        assert_eq!(
            encode_all(&mut pump, b"\xC0\xAF\xED\xA0\x80\xF5A"),
            b"A"
        );
    }

    #[test]
    fn unrepresentable_input_is_dropped() {
        let mut reg = builtin_registry();
        let mut pump = pump_for(&mut reg, "ISO8859-1");
        assert_eq!(encode_all(&mut pump, "\u{4E2D}A".as_bytes()), b"A");
    }
}
