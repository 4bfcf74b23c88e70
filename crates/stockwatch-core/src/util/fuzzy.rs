/// ## Summary
/// Case-insensitive interleaved-character match: every character of `pattern`
/// must appear in `haystack` in order, with anything in between.
///
/// An empty pattern matches everything.
#[must_use]
pub fn fuzzy_match(pattern: &str, haystack: &str) -> bool {
    let mut haystack = haystack.chars().flat_map(char::to_lowercase);
    pattern
        .chars()
        .flat_map(char::to_lowercase)
        .all(|wanted| haystack.any(|c| c == wanted))
}
