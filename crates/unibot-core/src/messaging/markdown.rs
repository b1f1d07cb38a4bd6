//! Helpers for Telegram's legacy Markdown.
//!
//! User-typed text goes through `escape` before it is placed in a markdown
//! message; an unbalanced `_` or `*` otherwise makes Telegram reject the
//! whole message.

const SPECIAL: [char; 4] = ['_', '*', '`', '['];

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `*text*`, or the escaped text without emphasis when it contains markup
/// characters. Escapes are not allowed inside an entity.
pub fn bold(text: &str) -> String {
    if text.contains(SPECIAL) {
        escape(text)
    } else {
        format!("*{text}*")
    }
}

/// Same rule as `bold`, for `_italic_`.
pub fn italic(text: &str) -> String {
    if text.contains(SPECIAL) {
        escape(text)
    } else {
        format!("_{text}_")
    }
}
