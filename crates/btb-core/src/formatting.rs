//! Small HTML helpers for Telegram messages.

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// First `max_chars` characters with an ellipsis, for confirmation previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_special_characters() {
        assert_eq!(
            escape_html(r#"<b> & "quotes""#),
            "&lt;b&gt; &amp; &quot;quotes&quot;"
        );
    }

    #[test]
    fn preview_truncates_long_text_on_char_boundaries() {
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("aaaa", 3), "aaa…");
        // Multi-byte characters count as one.
        assert_eq!(preview("héllo", 2), "hé…");
    }
}
