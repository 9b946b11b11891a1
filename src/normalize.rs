/// Characters dropped from names before searching.
const PUNCTUATION: &[char] = &['.', ',', ';', ':', '\'', '"', '!', '?', '(', ')'];

/// Corporate-form words that only add noise to a registry search.
const SUFFIXES: &[&str] = &["inc", "llc", "corp", "ltd", "limited", "pty"];

/// Turn a raw company name into a search token.
///
/// Lowercases, strips punctuation and drops corporate suffixes as whole words,
/// so "Lincoln Electric" keeps its "inc". Idempotent; may return an empty string.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped: String = lowered.chars().filter(|c| !PUNCTUATION.contains(c)).collect();
    stripped
        .split_whitespace()
        .filter(|word| !SUFFIXES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}
