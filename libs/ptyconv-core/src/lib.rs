//! # Purpose:
//! The ISO 2022 translation pump of the `ptyconv` terminal filter.
//!
//! Two pump instances run per session: the *output* pump translates the
//! child's locale-encoded bytes into UTF-8 for the terminal, the *input*
//! pump translates the terminal's UTF-8 keystrokes back into the child's
//! encoding. Both honour the ISO 2022 / ECMA-35 code-extension discipline:
//! four designated sets `G0..G3`, GL/GR cursors, single and locking
//! shifts, and designation escape sequences, with non-ISO-2022 multibyte
//! locales handled by their own codecs.
//!
//! ## Examples:
//! ```no_run
//! use std::rc::Rc;
//! use ptyconv_charset::{locale, Charsets, Config};
//! use ptyconv_core::PumpBuilder;
//!
//! let mut registry = Charsets::new(Rc::new(Config::new()));
//! let resolved = locale::resolve_locale_state(&mut registry, "de_DE.ISO8859-1", None).unwrap();
//!
//! let mut builder = PumpBuilder::new();
//! builder.apply_locale(&resolved);
//! let mut output = builder.build(&registry);
//!
//! let mut utf8 = Vec::new();
//! output.decode(&mut registry, b"Stra\xDFe", &mut utf8);
//! assert_eq!(utf8, "Stra\u{00DF}e".as_bytes());
//! ```

mod iso2022;
mod setup;

pub use iso2022::{InputFlags, Iso2022, OutputFlags};
pub use setup::PumpBuilder;
