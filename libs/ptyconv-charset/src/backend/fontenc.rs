//! Font-encoding (`.enc`) files.
//!
//! An `encodings.dir` index lists `alias path` pairs; each path names a
//! (typically gzip-compressed) text file describing one encoding with
//! `STARTENCODING` / `SIZE` / `FIRSTINDEX` / `STARTMAPPING unicode` /
//! numeric define lines / `UNDEFINE` / `ENDMAPPING` / `ENDENCODING`
//! directives. Only the mapping named "unicode" is consumed.

use crate::{
    config::{Config, ENCODINGS_DIR_FILE},
    mapping::{Mapping, MappingCache, MAX16, MAX8},
};
use flate2::read::MultiGzDecoder;
use snafu::{OptionExt, ResultExt, Snafu};
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    rc::Rc,
};
use tracing::{debug, warn};

#[derive(Debug, Snafu)]
pub enum FontencError {
    #[snafu(display("cannot open {}: {source}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("read error in {}: {source}", path.display()))]
    Line {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("found no count in {}", path.display()))]
    NoCount { path: PathBuf },

    #[snafu(display("incorrect format of line {row} in {}", path.display()))]
    BadLine { path: PathBuf, row: usize },
}

/// One `alias path` pair from `encodings.dir`.
pub struct DirEntry {
    pub alias: String,
    pub path: PathBuf,
}

/// The parsed `encodings.dir` index: a sorted alias list.
#[derive(Default)]
pub struct EncodingsDir {
    entries: Vec<DirEntry>,
}

impl EncodingsDir {
    /// Location of the index file: explicit configuration, then the
    /// `FONT_ENCODINGS_DIRECTORY` environment variable, then the built-in
    /// default.
    pub fn index_file(config: &Config) -> PathBuf {
        if let Some(path) = &config.encodings_dir_file {
            return path.clone();
        }
        if let Some(env) = std::env::var_os("FONT_ENCODINGS_DIRECTORY") {
            return PathBuf::from(env);
        }
        PathBuf::from(ENCODINGS_DIR_FILE)
    }

    pub fn load(config: &Config) -> Self {
        let path = Self::index_file(config);
        match Self::parse(&path) {
            Ok(dir) => dir,
            Err(error) => {
                debug!("no usable encodings.dir: {error}");
                Self::default()
            }
        }
    }

    fn parse(path: &Path) -> Result<Self, FontencError> {
        let file = File::open(path).context(OpenSnafu { path })?;
        let reader = BufReader::new(file);
        let mut entries: Vec<DirEntry> = Vec::new();
        let mut expected: Option<usize> = None;

        for (row, line) in reader.lines().enumerate() {
            let line = line.context(LineSnafu { path })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if expected.is_none() {
                let count: usize = line
                    .parse()
                    .ok()
                    .filter(|&n| n > 0)
                    .context(NoCountSnafu { path })?;
                expected = Some(count);
                entries.reserve(count);
                continue;
            }

            let (alias, value) = line
                .split_once(char::is_whitespace)
                .context(BadLineSnafu { path, row })?;
            // duplicates do occur in real indexes
            if !entries.iter().any(|e| e.alias == alias) {
                entries.push(DirEntry {
                    alias: alias.to_string(),
                    path: absolute_path(value.trim_start(), path),
                });
            }
            if entries.len() >= expected.unwrap() {
                break;
            }
        }

        entries.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn find(&self, name: &str) -> Option<&DirEntry> {
        self.entries
            .iter()
            .find(|e| e.alias.eq_ignore_ascii_case(name))
    }
}

/// Resolves a path from `encodings.dir` against the index's directory.
fn absolute_path(given: &str, index: &Path) -> PathBuf {
    let given = given.strip_prefix("./").unwrap_or(given);
    let given = Path::new(given);
    if given.is_absolute() {
        given.to_path_buf()
    } else {
        index.parent().unwrap_or(Path::new(".")).join(given)
    }
}

/// An encoding loaded from a `.enc` file.
pub struct FontEnc {
    pub name: String,
    pub aliases: Vec<String>,
    /// Size in bytes, or in rows when `row_size` is nonzero.
    pub size: u32,
    pub row_size: u32,
    pub first: u32,
    pub first_col: u32,
    /// Dense `unicode` mapping, indexed by packed code minus `first_flat`.
    map: Vec<u16>,
}

impl FontEnc {
    /// Total number of codes covered by the mapping table.
    pub fn enc_size(&self) -> usize {
        let size = if self.size != 0 { self.size } else { 256 } as usize;
        if self.row_size != 0 {
            size * 256
        } else {
            size
        }
    }

    /// First packed index covered by the table.
    fn first_flat(&self) -> u32 {
        if self.row_size != 0 {
            self.row_size * self.first + self.first_col
        } else {
            self.first
        }
    }

    /// Packs a `row * 256 + column` code into a table index.
    fn pack(&self, code: u32) -> Option<usize> {
        if self.row_size == 0 {
            return Some(code as usize);
        }
        let row = code >> 8;
        let col = code & 0xFF;
        if col >= self.row_size {
            return None;
        }
        Some((row * self.row_size + col) as usize)
    }

    /// Expands a packed table index back into a `row * 256 + column` code.
    pub fn unpack(&self, index: usize) -> Option<u32> {
        let from = index as u32 + self.first_flat();
        let code = if self.row_size == 0 {
            from
        } else {
            let row = from / self.row_size;
            let col = from % self.row_size;
            row * 256 + col
        };
        (code < MAX16 as u32).then_some(code)
    }

    fn define(&mut self, from: u32, to: u32) {
        let Some(packed) = self.pack(from)
            else {
                return;
            };
        let first = self.first_flat() as usize;
        if packed >= first && packed - first < self.map.len() {
            self.map[packed - first] = to as u16;
        }
    }

    /// The recoding value for a full `row * 256 + column` code: the mapped
    /// Unicode value, identity within the table's range when unmapped, and
    /// zero outside it.
    pub fn recode(&self, code: u32) -> u32 {
        match self.pack(code) {
            Some(packed) => {
                let first = self.first_flat() as usize;
                if packed >= first && packed - first < self.map.len() {
                    match self.map[packed - first] {
                        0 => code,
                        ucs => ucs as u32,
                    }
                } else if packed < self.enc_size() {
                    code
                } else {
                    0
                }
            }
            None => 0,
        }
    }

    /// Converts the loaded data into a [Mapping]. Gaps become the identity
    /// mapping, as the table covers the encoding's whole range.
    pub fn to_mapping(&self) -> Mapping {
        let table_size = if self.size <= 256 && self.row_size == 0 {
            MAX8
        } else {
            MAX16
        };
        let mut forward = vec![0u32; table_size];
        for index in 0..self.map.len() {
            let Some(code) = self.unpack(index)
                else {
                    continue;
                };
            if (code as usize) < table_size {
                let target = match self.map[index] {
                    0 => code,
                    ucs => ucs as u32,
                };
                forward[code as usize] = target;
            }
        }
        Mapping::from_forward(&self.name, forward)
    }

    /// Rebuilds a `.enc`-style view from an already-loaded mapping, for
    /// the `--show-builtin` / `--show-iconv` reports.
    pub fn from_mapping(mapping: &Mapping) -> Self {
        let mut map = vec![0u16; mapping.table_size()];
        let mut min_code = MAX16 as u32;
        let mut max_code = 0u32;
        for (code, ucs) in mapping.defined() {
            map[code as usize] = ucs as u16;
            if code != ucs {
                min_code = min_code.min(code);
                max_code = max_code.max(code);
            }
        }
        let (size, first) = if max_code >= 256 {
            (max_code + 1, min_code)
        } else {
            (256, 0)
        };
        map.truncate(size as usize);
        Self {
            name: mapping.name().to_string(),
            aliases: Vec::new(),
            size,
            row_size: 0,
            first,
            first_col: 0,
            map: map.split_off(first as usize),
        }
    }

    pub fn is_single_byte(&self) -> bool {
        self.size <= 256 && self.row_size == 0
    }
}

/// Reads a `.enc` file, transparently decompressing gzip.
fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, FontencError> {
    let mut file = File::open(path).context(OpenSnafu { path })?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic).context(LineSnafu { path })?;
    let file = File::open(path).context(OpenSnafu { path })?;
    if n == 2 && magic == [0x1F, 0x8B] {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Accepts decimal and `0x`-prefixed hexadecimal.
fn parse_number(token: &str) -> Option<u32> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

fn numbers(line: &str) -> Vec<u32> {
    line.split_whitespace()
        .map_while(parse_number)
        .take(3)
        .collect()
}

/// Loads one `.enc` file.
pub fn load_font_enc(alias: &str, path: &Path) -> Result<FontEnc, FontencError> {
    let reader = open_reader(path)?;
    let mut enc = FontEnc {
        name: String::new(),
        aliases: Vec::new(),
        size: 256,
        row_size: 0,
        first: 0,
        first_col: 0,
        map: Vec::new(),
    };
    let mut in_mapping = false;
    let mut ignore_mapping = false;

    for line in reader.lines() {
        let line = line.context(LineSnafu { path })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        let rest = rest.trim();

        if keyword.as_bytes()[0].is_ascii_digit() {
            if in_mapping && !ignore_mapping {
                match numbers(line)[..] {
                    [from, to] => enc.define(from, to),
                    [from, until, base] => {
                        for (offset, code) in (from..=until).enumerate() {
                            enc.define(code, base + offset as u32);
                        }
                    }
                    _ => {}
                }
            }
            continue;
        }

        match keyword.to_ascii_uppercase().as_str() {
            "STARTENCODING" => {
                enc.name = rest.split_whitespace().next().unwrap_or("").to_string();
            }
            "ALIAS" => {
                if let Some(name) = rest.split_whitespace().next() {
                    enc.aliases.push(name.to_string());
                }
            }
            "SIZE" => match numbers(rest)[..] {
                [size] => enc.size = size,
                [size, rows, ..] => {
                    enc.size = size;
                    enc.row_size = rows;
                }
                _ => {}
            },
            "FIRSTINDEX" => match numbers(rest)[..] {
                [first] => enc.first = first,
                [first, col, ..] => {
                    enc.first = first;
                    enc.first_col = col;
                }
                _ => {}
            },
            "STARTMAPPING" => {
                // only the unicode mapping is interesting
                if rest.eq_ignore_ascii_case("unicode") {
                    in_mapping = true;
                    ignore_mapping = false;
                    enc.map = vec![0u16; enc.enc_size()];
                } else {
                    in_mapping = true;
                    ignore_mapping = true;
                }
            }
            "UNDEFINE" => {
                if in_mapping && !ignore_mapping {
                    match numbers(rest)[..] {
                        [code] => enc.define(code, 0),
                        [from, until, ..] => {
                            for code in from..=until {
                                enc.define(code, 0);
                            }
                        }
                        _ => {}
                    }
                }
            }
            "ENDMAPPING" => {
                in_mapping = false;
                ignore_mapping = false;
            }
            "ENDENCODING" => break,
            _ => {}
        }
    }

    if enc.name.is_empty() {
        enc.name = alias.to_string();
    }
    Ok(enc)
}

pub fn lookup(cache: &mut MappingCache, dir: &EncodingsDir, name: &str) -> Option<Rc<Mapping>> {
    let entry = dir.find(name)?;
    match load_font_enc(&entry.alias, &entry.path) {
        Ok(enc) => Some(cache.insert(enc.to_mapping())),
        Err(error) => {
            warn!("cannot load data for {}: {error}", entry.path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KOI8_GR: &str = "\
# a toy single-byte encoding
STARTENCODING toy8-0
ALIAS toy8
SIZE 0x100
STARTMAPPING unicode
0xC1 0x0430
0xC2 0x0431
0xD0 0x043F
UNDEFINE 0xD0
ENDMAPPING
ENDENCODING
";

    const DBCS: &str = "\
STARTENCODING toy94x94-0
SIZE 0x5F 0x5F
FIRSTINDEX 0x21 0x21
STARTMAPPING unicode
0x2422 0x3042
0x2423 0x2424 0x3044
ENDMAPPING
ENDENCODING
";

    fn write_dir(files: &[(&str, &str, bool)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut index = format!("{}\n", files.len());
        for (alias, content, gzip) in files {
            let file_name = format!("{alias}.enc");
            let path = dir.path().join(&file_name);
            if *gzip {
                let mut encoder = flate2::write::GzEncoder::new(
                    File::create(&path).unwrap(),
                    flate2::Compression::default(),
                );
                encoder.write_all(content.as_bytes()).unwrap();
                encoder.finish().unwrap();
            } else {
                std::fs::write(&path, content).unwrap();
            }
            index.push_str(&format!("{alias} {file_name}\n"));
        }
        std::fs::write(dir.path().join("encodings.dir"), index).unwrap();
        dir
    }

    fn load(dir: &tempfile::TempDir) -> EncodingsDir {
        let mut config = Config::new();
        config.encodings_dir_file = Some(dir.path().join("encodings.dir"));
        EncodingsDir::load(&config)
    }

    #[test]
    fn single_byte_enc_file_is_loaded() {
        let dir = write_dir(&[("toy8-0", KOI8_GR, false)]);
        let index = load(&dir);
        let mut cache = MappingCache::default();
        let mapping = lookup(&mut cache, &index, "toy8-0").unwrap();

        assert_eq!(mapping.forward(0xC1), Some(0x0430));
        assert_eq!(mapping.reverse(0x0431), Some(0xC2));
        // UNDEFINE reverts the code to the identity fill
        assert_eq!(mapping.forward(0xD0), Some(0xD0));
        // gaps fill with identity
        assert_eq!(mapping.forward(0x41), Some(0x41));
    }

    #[test]
    fn gzipped_enc_file_is_loaded() {
        let dir = write_dir(&[("toy8-0", KOI8_GR, true)]);
        let index = load(&dir);
        let mut cache = MappingCache::default();
        let mapping = lookup(&mut cache, &index, "TOY8-0").unwrap();
        assert_eq!(mapping.forward(0xC2), Some(0x0431));
    }

    #[test]
    fn double_byte_enc_file_uses_row_packing() {
        let dir = write_dir(&[("toy94x94-0", DBCS, false)]);
        let index = load(&dir);
        let mut cache = MappingCache::default();
        let mapping = lookup(&mut cache, &index, "toy94x94-0").unwrap();

        assert_eq!(mapping.table_size(), MAX16);
        assert_eq!(mapping.forward(0x2422), Some(0x3042));
        // three-number range form: 0x2423 -> base, 0x2424 -> base + 1
        assert_eq!(mapping.forward(0x2423), Some(0x3044));
        assert_eq!(mapping.forward(0x2424), Some(0x3045));
        assert_eq!(mapping.reverse(0x3042), Some(0x2422));
    }

    #[test]
    fn missing_index_yields_empty_directory() {
        let mut config = Config::new();
        config.encodings_dir_file = Some(PathBuf::from("/nonexistent/encodings.dir"));
        let index = EncodingsDir::load(&config);
        assert!(index.entries().is_empty());
    }
}
