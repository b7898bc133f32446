//! Maps free-text control descriptions onto Prometheus-safe metric name fragments.

use deunicode::deunicode;

/// Characters folded into a single `-` by the filename sanitizer.
const JOINERS: [char; 6] = [' ', '&', '_', '=', '+', ':'];

/// Turn an arbitrary control description into a metric identifier fragment.
///
/// The result only contains `[a-z0-9_]`, never starts a run of two
/// underscores, and is never empty. Feeding the output back in returns it
/// unchanged.
pub fn normalize_identifier(description: &str) -> String {
    let unslashed = deunicode(description).replace(['/', '\\'], "_");
    let sanitized = sanitize_name(&unslashed);
    let underscored = sanitized.replace('-', "_");
    let dotted = underscored.replace("_.", "_dot_").replace('.', "_");
    let collapsed = collapse_runs(&dotted, '_');
    if collapsed.is_empty() {
        "_".to_string()
    } else {
        collapsed
    }
}

/// Conservative "safe filename" pass over transliterated input: lowercase,
/// joiners to `-`, allow-list `[a-z0-9-.]`.
fn sanitize_name(input: &str) -> String {
    let lowered = input.to_ascii_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for ch in lowered.trim_matches(' ').chars() {
        if JOINERS.contains(&ch) {
            out.push('-');
        } else if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
            out.push(ch);
        }
    }
    collapse_runs(&out, '-')
}

fn collapse_runs(input: &str, sep: char) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous = None;
    for ch in input.chars() {
        if ch == sep && previous == Some(sep) {
            continue;
        }
        out.push(ch);
        previous = Some(ch);
    }
    out
}
