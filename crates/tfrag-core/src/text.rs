//! Query text normalization shared by the scope gate and the classifier.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Lowercase and strip diacritics ("Cómo" → "como", "ñ" → "n").
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Strip diacritics without changing case. Used on regex sources, where
/// lowercasing would alter escapes like `\W`.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Normalized word tokens with punctuation removed.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .unicode_words()
        .map(str::to_string)
        .collect()
}
