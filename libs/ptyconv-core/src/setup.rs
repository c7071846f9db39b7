use crate::iso2022::{InputFlags, Iso2022, OutputFlags};
use ptyconv_charset::{locale::ResolvedLocale, Charset, CharsetKind, Charsets};
use std::rc::Rc;

/// Accumulates a pump configuration from the command line and the
/// resolved locale, then builds the direction state.
///
/// Precedence follows the original setup order: explicit command-line
/// designations stay; the locale fills what is left; the input direction
/// finally inherits whatever the output direction resolved.
pub struct PumpBuilder {
    pub g: [Option<Rc<Charset>>; 4],
    pub gl: Option<usize>,
    pub gr: Option<usize>,
    pub other: Option<Rc<Charset>>,
    pub input_flags: InputFlags,
    pub output_flags: OutputFlags,
}

impl PumpBuilder {
    pub fn new() -> Self {
        Self {
            g: [None, None, None, None],
            gl: None,
            gr: None,
            other: None,
            input_flags: InputFlags::default(),
            output_flags: OutputFlags::default(),
        }
    }

    /// Fills everything the command line left unset from the locale.
    pub fn apply_locale(&mut self, resolved: &ResolvedLocale) {
        for (slot, from_locale) in self.g.iter_mut().zip(resolved.g.iter()) {
            if slot.is_none() {
                *slot = from_locale.clone();
            }
        }
        if self.gl.is_none() {
            self.gl = Some(resolved.gl);
        }
        if self.gr.is_none() {
            self.gr = Some(resolved.gr);
        }
        if self.other.is_none() {
            self.other = resolved.other.clone();
        }
    }

    /// Fills everything still unset from the other direction's setup.
    pub fn merge_from(&mut self, source: &PumpBuilder) {
        for (slot, from_source) in self.g.iter_mut().zip(source.g.iter()) {
            if slot.is_none() {
                *slot = from_source.clone();
            }
        }
        if self.gl.is_none() {
            self.gl = source.gl;
        }
        if self.gr.is_none() {
            self.gr = source.gr;
        }
        if self.other.is_none() {
            self.other = source.other.clone();
        }
    }

    /// Builds the direction state. Slots never designated bind the
    /// "unknown" sentinel of the conventional shape (94 codes for G0, 96
    /// codes for G1..G3), which passes output through and refuses input.
    pub fn build(&self, registry: &Charsets) -> Iso2022 {
        let g = [
            self.g[0]
                .clone()
                .unwrap_or_else(|| registry.unknown(CharsetKind::Code94)),
            self.g[1]
                .clone()
                .unwrap_or_else(|| registry.unknown(CharsetKind::Code96)),
            self.g[2]
                .clone()
                .unwrap_or_else(|| registry.unknown(CharsetKind::Code96)),
            self.g[3]
                .clone()
                .unwrap_or_else(|| registry.unknown(CharsetKind::Code96)),
        ];
        Iso2022::new(
            g,
            self.gl.unwrap_or(0),
            self.gr.unwrap_or(2),
            self.input_flags,
            self.output_flags,
            self.other.clone(),
        )
    }
}

impl Default for PumpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Iso2022 {
    /// A one-line description of the resolved state, for verbose mode.
    pub fn report(&self, label: &str) -> String {
        if let Some(name) = self.other_name() {
            return format!("{label}: {name} (non-ISO-2022 encoding)");
        }
        let mut line = format!("{label}: GL -> G{}, GR -> G{}", self.gl(), self.gr());
        for slot in 0..4 {
            let charset = self.g(slot);
            if !charset.is_unknown() {
                line.push_str(&format!(", G{slot}: {}", charset.name));
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptyconv_charset::{locale, Config};

    fn registry() -> Charsets {
        let mut config = Config::new();
        config.set_lookup_order("builtin").unwrap();
        config.lookup_order.truncate(1);
        Charsets::new(Rc::new(config))
    }

    #[test]
    fn locale_fills_only_unset_slots() {
        let mut reg = registry();
        let resolved = locale::resolve_locale_state(&mut reg, "C", Some("ISO8859-5")).unwrap();

        let mut builder = PumpBuilder::new();
        builder.g[2] = Some(reg.get_by_name("ISO 8859-15"));
        builder.apply_locale(&resolved);

        assert_eq!(builder.g[0].as_ref().unwrap().name, "ASCII");
        // the explicit G2 survives the locale's ISO 8859-5
        assert_eq!(builder.g[2].as_ref().unwrap().name, "ISO 8859-15");
        assert_eq!(builder.gr, Some(2));
    }

    #[test]
    fn input_inherits_from_output() {
        let mut reg = registry();
        let resolved = locale::resolve_locale_state(&mut reg, "C", Some("ISO8859-5")).unwrap();

        let mut output = PumpBuilder::new();
        output.apply_locale(&resolved);
        let mut input = PumpBuilder::new();
        input.merge_from(&output);

        assert_eq!(input.g[2].as_ref().unwrap().name, "ISO 8859-5");
        assert_eq!(input.gl, Some(0));
    }

    #[test]
    fn report_names_the_designated_sets() {
        let mut reg = registry();
        let resolved = locale::resolve_locale_state(&mut reg, "C", Some("ISO8859-5")).unwrap();
        let mut builder = PumpBuilder::new();
        builder.apply_locale(&resolved);
        let pump = builder.build(&reg);

        let report = pump.report("Output");
        assert!(report.contains("GL -> G0"));
        assert!(report.contains("G2: ISO 8859-5"));
    }
}
