//! Code-mapping providers.
//!
//! Four interchangeable backends supply `code <-> UCS-4` mappings: built-in
//! tables, `.enc` font-encoding files, the host iconv library, and a
//! trivial ASCII-only fallback. A lookup walks the configured priority
//! order; the first backend that produces a mapping wins.

pub mod builtin;
pub mod fontenc;
pub mod iconv;

use crate::{
    config::Config,
    mapping::{MapSize, Mapping, MappingCache, MAX8},
};
use bitflags::bitflags;
use std::rc::Rc;
use tracing::debug;

/// One of the code-mapping providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Builtin,
    Fontenc,
    Iconv,
    Posix,
}

impl Backend {
    /// The default lookup priority: `.enc` files, then built-in tables,
    /// then iconv, then the ASCII fallback.
    pub const DEFAULT_ORDER: [Backend; 4] = [
        Backend::Fontenc,
        Backend::Builtin,
        Backend::Iconv,
        Backend::Posix,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Backend::Builtin => "builtin",
            Backend::Fontenc => "fontenc",
            Backend::Iconv => "iconv",
            Backend::Posix => "posix",
        }
    }

    pub fn mask(self) -> BackendMask {
        match self {
            Backend::Builtin => BackendMask::BUILTIN,
            Backend::Fontenc => BackendMask::FONTENC,
            Backend::Iconv => BackendMask::ICONV,
            Backend::Posix => BackendMask::POSIX,
        }
    }
}

bitflags! {
    /// Which backends a particular lookup may consult.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BackendMask: u8 {
        const BUILTIN = 1 << 0;
        const FONTENC = 1 << 1;
        const ICONV   = 1 << 2;
        const POSIX   = 1 << 3;
    }
}

impl BackendMask {
    pub const ANY: BackendMask = BackendMask::all();
}

/// The backend chain together with its process-wide caches.
pub struct Backends {
    config: Rc<Config>,
    cache: MappingCache,
    encodings_dir: Option<Rc<fontenc::EncodingsDir>>,
}

impl Backends {
    pub fn new(config: Rc<Config>) -> Self {
        Self {
            config,
            cache: MappingCache::default(),
            encodings_dir: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The `encodings.dir` index, loaded on first use.
    pub fn encodings_dir(&mut self) -> Rc<fontenc::EncodingsDir> {
        if self.encodings_dir.is_none() {
            self.encodings_dir = Some(Rc::new(fontenc::EncodingsDir::load(&self.config)));
        }
        self.encodings_dir.as_ref().unwrap().clone()
    }

    /// The GB18030 mapping pair: the two-byte plane and the four-byte
    /// plane keyed by linear pointer. `.enc` data is preferred; otherwise
    /// both planes are derived from iconv in one sweep.
    pub fn gb18030_mappings(&mut self) -> Option<(Rc<Mapping>, Rc<Mapping>)> {
        let file_mask = BackendMask::FONTENC | BackendMask::BUILTIN;
        let two = self.lookup("gb18030.2000-0", file_mask, MapSize::Bits16);
        let four = self.lookup("gb18030.2000-1", file_mask, MapSize::Bits16);
        match (two, four) {
            (Some(two), Some(four)) => Some((two, four)),
            _ if self.config.lookup_order.contains(&Backend::Iconv) => {
                iconv::gb18030_parts(&mut self.cache)
            }
            _ => None,
        }
    }

    /// Resolves an encoding name to a mapping, trying each enabled backend
    /// in the configured order. The first success wins and is cached.
    pub fn lookup(&mut self, name: &str, mask: BackendMask, size: MapSize) -> Option<Rc<Mapping>> {
        if let Some(found) = self.cache.find(name) {
            debug!("mapping '{}' found in cache", name);
            return Some(found);
        }

        let order = self.config.lookup_order.clone();
        for backend in order {
            if !mask.contains(backend.mask()) {
                continue;
            }
            let result = match backend {
                Backend::Builtin => builtin::lookup(&mut self.cache, name),
                Backend::Fontenc => {
                    let dir = self.encodings_dir();
                    fontenc::lookup(&mut self.cache, &dir, name)
                }
                Backend::Iconv => iconv::lookup(&mut self.cache, name, size),
                Backend::Posix => Some(posix_fallback(&mut self.cache, name)),
            };
            if let Some(found) = result {
                debug!("mapping '{}' loaded via {}", name, backend.keyword());
                return Some(found);
            }
        }
        None
    }
}

/// The trivial fallback: identity for `0..=127`, nothing above.
fn posix_fallback(cache: &mut MappingCache, name: &str) -> Rc<Mapping> {
    let mut forward = vec![0u32; MAX8];
    for (code, slot) in forward.iter_mut().enumerate().take(0x80) {
        *slot = code as u32;
    }
    cache.insert(Mapping::from_forward(name, forward))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends_with_order(list: &str) -> Backends {
        let mut config = Config::new();
        config.set_lookup_order(list).unwrap();
        Backends::new(Rc::new(config))
    }

    #[test]
    fn posix_fallback_is_ascii_only() {
        let mut b = backends_with_order("posix");
        let m = b.lookup("no-such-thing", BackendMask::ANY, MapSize::Any).unwrap();
        assert_eq!(m.forward(0x41), Some(0x41));
        assert_eq!(m.forward(0xE9), None);
        assert_eq!(m.reverse(0xE9), None);
    }

    #[test]
    fn mask_restricts_backends() {
        let mut b = backends_with_order("posix");
        assert!(b
            .lookup("no-such-thing", BackendMask::BUILTIN, MapSize::Any)
            .is_none());
    }

    #[test]
    fn lookups_are_cached() {
        let mut b = backends_with_order("builtin");
        let first = b.lookup("iso8859-5", BackendMask::ANY, MapSize::Any).unwrap();
        let second = b.lookup("ISO 8859/5", BackendMask::ANY, MapSize::Any).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
