//! The `--list-*` and `--show-*` reporting commands.

use ptyconv_charset::{
    backend::{builtin, fontenc, BackendMask},
    locale::LOCALE_CHARSETS,
    mapping::{MapSize, Mapping},
    Charsets,
};
use std::ffi::{CStr, CString};
use std::process::ExitCode;

const MAX_COLUMNS: usize = 78;

/// `--list`: the locale encodings and charsets this program knows.
pub fn list_known() {
    println!("Known locale encodings:\n");
    for row in LOCALE_CHARSETS.iter() {
        if let Some(other) = row.other {
            println!("  {other} (non-ISO-2022 encoding)");
            continue;
        }
        print!("  {}: GL -> G{}, GR -> G{}", row.name, row.gl, row.gr);
        for (slot, name) in row.g.iter().enumerate() {
            if let Some(name) = name {
                print!(", G{slot}: {name}");
            }
        }
        println!();
    }

    println!("\n\nKnown charsets (not all may be available):\n");
    for charset in Charsets::all_known() {
        print!("  {}", charset.name);
        if charset.final_byte != 0 {
            print!(" (ISO 2022, {})", charset.kind.describe());
        } else {
            print!(" ({})", charset.kind.describe());
        }
        println!();
    }
}

fn mapping_summary(mapping: &Mapping) -> String {
    let mut low = u32::MAX;
    let mut high = 0;
    let mut count = 0usize;
    for (code, _) in mapping.defined() {
        low = low.min(code);
        high = high.max(code);
        count += 1;
    }
    if count == 0 {
        "\tData: empty".to_string()
    } else {
        format!("\tData: [{low:04X}..{high:04X}] defined {count}")
    }
}

/// `--list-builtin`: the encodings usable without external data.
pub fn list_builtin() -> ExitCode {
    println!("These encodings are used if fontenc/iconv data are missing:");
    println!();
    for encoding in builtin::BUILTIN_ENCODINGS.iter() {
        println!("{}", encoding.name);
        let mapping = Mapping::from_forward(encoding.name, (encoding.table)());
        println!("{}", mapping_summary(&mapping));
    }
    ExitCode::SUCCESS
}

/// `--list-fontenc`: every `.enc` file the encodings.dir index names.
pub fn list_fontenc(registry: &mut Charsets) -> ExitCode {
    let index_file = fontenc::EncodingsDir::index_file(registry.config());
    println!(
        "Available encodings listed in:\n\t{}",
        index_file.display()
    );
    let dir = registry.backends().encodings_dir();
    let mut found = false;
    for entry in dir.entries() {
        println!("{}\n\t{}", entry.alias, entry.path.display());
        match fontenc::load_font_enc(&entry.alias, &entry.path) {
            Ok(enc) => {
                found = true;
                println!("\tName: {}", enc.name);
                for alias in &enc.aliases {
                    println!("\t      {alias}");
                }
                if enc.row_size != 0 {
                    println!(
                        "\tSize: {} {} ({})",
                        enc.size,
                        enc.row_size,
                        enc.size * enc.row_size
                    );
                } else {
                    println!("\tSize: {}", enc.size);
                }
                println!("\tBase: {:04X}", (enc.first << 8) + enc.first_col);
                println!("{}", mapping_summary(&enc.to_mapping()));
            }
            Err(error) => {
                eprintln!("Warning: cannot load data for {}: {error}", entry.path.display());
            }
        }
    }
    if found {
        ExitCode::SUCCESS
    } else {
        eprintln!("Warning: no encodings found");
        ExitCode::FAILURE
    }
}

fn current_codeset() -> Option<String> {
    let ptr = unsafe { libc::nl_langinfo(libc::CODESET) };
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `--list-iconv`: every encoding reachable through the host's locales.
pub fn list_iconv() -> ExitCode {
    let output = match std::process::Command::new("locale").arg("-a").output() {
        Ok(output) if output.status.success() => output,
        _ => {
            eprintln!("No locales found");
            return ExitCode::FAILURE;
        }
    };

    let saved = unsafe { libc::setlocale(libc::LC_CTYPE, std::ptr::null()) };
    let saved = if saved.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(saved) }.to_owned())
    };

    // group the locales by the codeset they resolve to
    let mut encodings: Vec<(String, Vec<String>)> = Vec::new();
    for locale in String::from_utf8_lossy(&output.stdout).lines() {
        let locale = locale.trim();
        if locale.is_empty() {
            continue;
        }
        let Ok(locale_c) = CString::new(locale)
            else {
                continue;
            };
        if unsafe { libc::setlocale(libc::LC_CTYPE, locale_c.as_ptr()) }.is_null() {
            continue;
        }
        let Some(codeset) = current_codeset()
            else {
                continue;
            };
        match encodings.iter_mut().find(|(name, _)| *name == codeset) {
            Some((_, locales)) => {
                if !locales.iter().any(|l| l == locale) {
                    locales.push(locale.to_string());
                }
            }
            None => encodings.push((codeset, vec![locale.to_string()])),
        }
    }

    if let Some(saved) = saved {
        unsafe { libc::setlocale(libc::LC_CTYPE, saved.as_ptr()) };
    }

    if encodings.is_empty() {
        eprintln!("No encodings found");
        return ExitCode::FAILURE;
    }

    println!("Iconv supports {} encodings", encodings.len());
    encodings.sort_by(|a, b| a.0.cmp(&b.0));
    for (codeset, mut locales) in encodings {
        println!("  {codeset}");
        locales.sort();
        let mut column = 0;
        for (index, locale) in locales.iter().enumerate() {
            let more = index + 1 < locales.len();
            let width = locale.len() + if more { 2 } else { 0 };
            if column + width > MAX_COLUMNS {
                println!();
                column = 0;
            }
            if column == 0 {
                print!("    ");
                column = 4;
            }
            print!("{locale}{}", if more { ", " } else { "" });
            column += width;
        }
        println!();
    }
    ExitCode::SUCCESS
}

/// Regurgitates an encoding in `.enc` format.
fn show_enc(enc: &fontenc::FontEnc, fill: bool) {
    println!("STARTENCODING {}", enc.name);
    for alias in &enc.aliases {
        println!("ALIAS {alias}");
    }
    if enc.row_size != 0 {
        println!("SIZE {} {}", enc.size, enc.row_size);
    } else if enc.size != 0 {
        println!("SIZE {}", enc.size);
    }
    if enc.first_col != 0 {
        println!("FIRSTINDEX {} {}", enc.first, enc.first_col);
    } else if enc.first != 0 {
        println!("FIRSTINDEX {}", enc.first);
    }

    println!("STARTMAPPING unicode");
    let limit = if enc.row_size != 0 {
        0x10000
    } else {
        enc.enc_size() as u32
    };
    for code in 0..limit {
        let ucs = enc.recode(code);
        if ucs == 0 && code != 0 {
            continue;
        }
        if !fill && ucs == code {
            continue;
        }
        println!("0x{code:04X} 0x{ucs:04X}");
    }
    println!("ENDMAPPING");
    println!("ENDENCODING");
}

/// `--show-builtin`: a built-in table in `.enc` format.
pub fn show_builtin(registry: &mut Charsets, name: &str) -> ExitCode {
    let fill = registry.config().fill_fontenc;
    match builtin::find(name) {
        Some(encoding) => {
            println!("# {name}");
            let mapping = Mapping::from_forward(encoding.name, (encoding.table)());
            show_enc(&fontenc::FontEnc::from_mapping(&mapping), fill);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("Warning: no encoding data found for {name}");
            ExitCode::FAILURE
        }
    }
}

/// `--show-fontenc`: an `.enc` file, reparsed and printed back.
pub fn show_fontenc(registry: &mut Charsets, name: &str) -> ExitCode {
    let fill = registry.config().fill_fontenc;
    let dir = registry.backends().encodings_dir();
    let loaded = dir
        .find(name)
        .and_then(|entry| fontenc::load_font_enc(&entry.alias, &entry.path).ok());
    match loaded {
        Some(enc) => {
            println!("# {name}");
            show_enc(&enc, fill);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("Warning: no encoding data found for {name}");
            ExitCode::FAILURE
        }
    }
}

/// `--show-iconv`: an iconv-derived table in `.enc` format.
pub fn show_iconv(registry: &mut Charsets, name: &str) -> ExitCode {
    let fill = registry.config().fill_fontenc;
    let mapping = registry
        .backends()
        .lookup(name, BackendMask::ICONV, MapSize::Any);
    match mapping {
        Some(mapping) => {
            println!("# {name}");
            show_enc(&fontenc::FontEnc::from_mapping(&mapping), fill);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("Warning: no encoding data found for {name}");
            ExitCode::FAILURE
        }
    }
}
