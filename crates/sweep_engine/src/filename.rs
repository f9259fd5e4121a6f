use crate::export::ExportFormat;

const MAX_STEM: usize = 80;

/// Windows-safe export name: `{prefix}_{stamp}.{ext}`.
///
/// The caller supplies the stamp (usually a local date-time), so the same
/// inputs always give the same name.
pub fn export_filename(prefix: &str, stamp: &str, format: ExportFormat) -> String {
    let prefix = sanitize(prefix);
    let stamp = sanitize(stamp);
    let mut stem = match (prefix.is_empty(), stamp.is_empty()) {
        (true, true) => "export".to_string(),
        (false, true) => prefix,
        (true, false) => format!("export_{stamp}"),
        (false, false) => format!("{prefix}_{stamp}"),
    };
    if stem.chars().count() > MAX_STEM {
        stem = stem.chars().take(MAX_STEM).collect();
    }
    if is_reserved_windows_name(&stem) {
        stem.push('_');
    }
    format!("{stem}.{}", format.extension())
}

fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) || c.is_whitespace() { '_' } else { c };
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out.trim_matches(&['_', ' ', '.'][..]).to_string()
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
