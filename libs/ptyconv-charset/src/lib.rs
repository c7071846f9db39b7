//! # Purpose:
//! Character-set support for the `ptyconv` terminal filter.
//!
//! This crate turns locale and charset names into usable code mappings:
//!
//! - [Charsets] - the registry resolving ISO 2022 designator finals and
//!   charset names into shared [Charset] records;
//! - [Backends] - the prioritised code-mapping providers (built-in tables,
//!   `.enc` font-encoding files, the host iconv library, and a trivial
//!   ASCII fallback);
//! - [OtherCodec] - the non-ISO-2022 multibyte codecs (UTF-8, GBK, SJIS,
//!   Big5-HKSCS, GB18030);
//! - [locale] - the locale-name resolver and the locale-to-G0..G3 table.
//!
//! ## Examples:
//! ```no_run
//! use std::rc::Rc;
//! use ptyconv_charset::{Charsets, CharsetKind, Config};
//!
//! let mut registry = Charsets::new(Rc::new(Config::new()));
//! // `ESC - A` designates ISO 8859-1 into G1:
//! let latin1 = registry.get_by_final(b'A', CharsetKind::Code96);
//! assert_eq!(latin1.recode(0x69), Some(0xE9)); // GR 0xE9 -> U+00E9
//! ```

pub mod backend;
pub mod charset;
pub mod config;
pub mod locale;
pub mod mapping;
pub mod other;
pub(crate) mod tables;

pub use backend::{Backend, BackendMask, Backends};
pub use charset::{fuzzy_eq, Charset, CharsetKind, Charsets};
pub use config::Config;
pub use locale::{resolve_locale, ResolvedLocale};
pub use mapping::{MapSize, Mapping, MappingCache};
pub use other::{OtherCodec, OtherState, Step};
