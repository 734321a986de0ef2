//! Telegram HTML format converter.
//!
//! ChatPDF answers carry lightweight Markdown: `**bold**` and, rarely,
//! `` `code` ``. Telegram's HTML parse mode needs only `&`, `<` and `>`
//! escaped, so the text is escaped first and the markers are then turned
//! into tags.

use regex::Regex;
use std::sync::LazyLock;

static BOLD_DOUBLE_ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold pattern"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+?)`").expect("valid code pattern"));

/// Convert answer markup to Telegram-compatible HTML.
///
/// | Input         | Output               |
/// |---------------|----------------------|
/// | `**bold**`    | `<b>bold</b>`        |
/// | `` `code` ``  | `<code>code</code>`  |
/// | `a < b & c`   | `a &lt; b &amp; c`   |
pub fn convert_to_telegram_html(input: &str) -> String {
    let escaped = escape_html(input);

    let with_bold = BOLD_DOUBLE_ASTERISK.replace_all(&escaped, "<b>$1</b>");

    INLINE_CODE
        .replace_all(&with_bold, "<code>$1</code>")
        .into_owned()
}

/// Escape HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
