//! Word-level string operations for the macro language.
//!
//! Values in the configuration language are lists of whitespace-separated
//! words. Double quotes group words that contain whitespace; the quotes
//! themselves are stripped.

/// Split text into words. Whitespace separates words except inside
/// double quotes, which are removed from the result.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Join words with single spaces.
pub fn join_words(words: &[String]) -> String {
    words.join(" ")
}

/// Apply a `%`-pattern substitution to a single word.
///
/// The pattern contains at most one `%`, matching any (possibly empty)
/// stem. A matching word is rewritten to the replacement with its first
/// `%` substituted by the stem. Non-matching words pass through unchanged.
pub fn patsubst(pattern: &str, replacement: &str, word: &str) -> String {
    match pattern.split_once('%') {
        Some((prefix, suffix)) => {
            if word.len() >= prefix.len() + suffix.len()
                && word.starts_with(prefix)
                && word.ends_with(suffix)
            {
                let stem = &word[prefix.len()..word.len() - suffix.len()];
                replacement.replacen('%', stem, 1)
            } else {
                word.to_string()
            }
        }
        None => {
            if word == pattern {
                replacement.to_string()
            } else {
                word.to_string()
            }
        }
    }
}

/// Replace every occurrence of `from` within a single word.
pub fn subst(from: &str, to: &str, word: &str) -> String {
    if from.is_empty() {
        return word.to_string();
    }
    word.replace(from, to)
}
