use crate::backend::Backend;
use snafu::{ensure, Snafu};
use std::path::PathBuf;

/// Default location of the X locale alias file.
pub const LOCALE_ALIAS_FILE: &str = "/usr/share/X11/locale/locale.alias";

/// Default location of the font-encodings index file.
pub const ENCODINGS_DIR_FILE: &str = "/usr/share/fonts/X11/encodings/encodings.dir";

#[derive(Debug, Snafu, PartialEq)]
pub enum PreferError {
    #[snafu(display("invalid item in lookup preference list: {token}"))]
    InvalidToken { token: String },

    #[snafu(display("repeated keyword in lookup preference list: {token}"))]
    RepeatedToken { token: String },
}

/// Immutable startup configuration threaded through the registry and the
/// backends.
///
/// Constructed once from the command line; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend priority for code-mapping lookups.
    pub lookup_order: Vec<Backend>,

    /// Fill one-to-one gaps instead of trimming them in `.enc`-format
    /// reports.
    pub fill_fontenc: bool,

    /// Location of the locale alias file.
    pub alias_file: PathBuf,

    /// Override for the `encodings.dir` index. When unset, the
    /// `FONT_ENCODINGS_DIRECTORY` environment variable and then the
    /// built-in default are consulted.
    pub encodings_dir_file: Option<PathBuf>,

    /// An explicit encoding was given; do not consult the host locale
    /// database.
    pub ignore_locale: bool,
}

impl Config {
    pub fn new() -> Self {
        Self {
            lookup_order: Backend::DEFAULT_ORDER.to_vec(),
            fill_fontenc: false,
            alias_file: PathBuf::from(LOCALE_ALIAS_FILE),
            encodings_dir_file: None,
            ignore_locale: false,
        }
    }

    /// Parses a `--prefer` list: comma-separated backend names, matched by
    /// unambiguous prefix. Duplicates are an error; tokens not mentioned
    /// are appended in default order.
    pub fn set_lookup_order(&mut self, list: &str) -> Result<(), PreferError> {
        let mut order: Vec<Backend> = Vec::with_capacity(Backend::DEFAULT_ORDER.len());

        for token in list.split(',').filter(|t| !t.is_empty()) {
            let matched = Backend::DEFAULT_ORDER
                .iter()
                .copied()
                .find(|b| b.keyword().starts_with(token));
            let Some(backend) = matched
                else {
                    return InvalidTokenSnafu { token }.fail();
                };
            ensure!(!order.contains(&backend), RepeatedTokenSnafu { token });
            order.push(backend);
        }

        for &backend in self.lookup_order.iter() {
            if !order.contains(&backend) {
                order.push(backend);
            }
        }

        self.lookup_order = order;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_prefer_list_parsed_correctly() {
        let mut c = Config::new();
        c.set_lookup_order("iconv").unwrap();
        assert_eq!(
            c.lookup_order,
            vec![
                Backend::Iconv,
                Backend::Fontenc,
                Backend::Builtin,
                Backend::Posix
            ]
        );

        // Prefix matching works and missing tokens keep their relative order
        let mut c = Config::new();
        c.set_lookup_order("b,i").unwrap();
        assert_eq!(
            c.lookup_order,
            vec![
                Backend::Builtin,
                Backend::Iconv,
                Backend::Fontenc,
                Backend::Posix
            ]
        );

        let mut c = Config::new();
        assert_eq!(
            c.set_lookup_order("fontenc,fontenc"),
            Err(PreferError::RepeatedToken {
                token: "fontenc".into()
            })
        );
        assert!(matches!(
            c.set_lookup_order("nonsense"),
            Err(PreferError::InvalidToken { .. })
        ));
    }
}
