//! Removal of markdown code fences from model output.

use std::sync::LazyLock;

use regex::Regex;

/// A line that is nothing but a fence marker, optionally tagged (```` ```python ````).
static FENCE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\S\n]*```[A-Za-z0-9_+.-]*[^\S\n]*(?:\n|$)").expect("fence regex is valid")
});

/// An opening fence glued to the first line of code (```` ```python print(1) ````).
///
/// Only well-known language tags are taken as tags here; anything else after the
/// backticks is treated as code.
static LEADING_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\A```(?:(?i:python3?|py|bash|sh|shell|zsh|javascript|js|typescript|ts|ruby|rb|rust|rs|go|java|cpp|perl|php|lua|plaintext|text)[^\S\n]+)?",
    )
    .expect("leading fence regex is valid")
});

/// A closing fence glued to the end of a line of code (```` print(1)``` ````).
static TRAILING_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:```)+[^\S\n]*$").expect("trailing fence regex is valid")
});

/// Strip code-fence markers and surrounding whitespace from a model response.
///
/// Removes whole fence lines anywhere, an opening fence at the very start and
/// closing fences at the end of a line. A fence in the middle of a line (a string
/// literal such as `"```"`) is kept. Passes repeat until nothing changes, so the
/// result is a fixed point: applying this twice gives the same result as once.
pub fn strip_code_fences(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let text = FENCE_LINE_RE.replace_all(text.trim(), "");
    let text = LEADING_FENCE_RE.replace(text.trim(), "");
    TRAILING_FENCE_RE.replace_all(&text, "").trim().to_string()
}
