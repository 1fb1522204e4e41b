//! Display-name normalization.
//!
//! Every source runs its names through the same function, so two true
//! matches must normalize identically — this is the invariant the whole
//! matching layer rests on. The function is pure, deterministic, and
//! idempotent: `normalize_name(normalize_name(x)) == normalize_name(x)`.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Honorific suffixes stripped from the end of a name.
const SUFFIXES: [&str; 5] = ["JR", "SR", "II", "III", "IV"];

/// Map a display name to its canonical comparison key.
///
/// NFKD-decomposes and drops combining marks (so `José` and `JOSE`
/// agree), collapses apostrophes and hyphens to spaces, uppercases,
/// collapses whitespace, and strips trailing honorific suffixes.
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            '\'' | '\u{2019}' | '`' | '-' => ' ',
            _ => c,
        })
        .collect();

    let upper = stripped.to_uppercase();
    let mut tokens: Vec<&str> = upper.split_whitespace().collect();

    // Suffixes only ever trail a name; never strip a lone token.
    while tokens.len() > 1 {
        let last = tokens.last().unwrap().trim_end_matches('.');
        if SUFFIXES.contains(&last) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}
