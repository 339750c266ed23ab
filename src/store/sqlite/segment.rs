//! Per-character segmentation of CJK text for FTS5.
//!
//! `unicode61` splits on whitespace and punctuation only, so a Chinese or
//! Japanese sentence would index as one long token. Indexed text gets a space
//! around every Han or kana character, which makes each one its own token the
//! way a search engine's standard analyzer does. On the query side a run of
//! such characters becomes a phrase, so `咖啡` matches the adjacent tokens
//! `咖 啡` and nothing else.

/// Han ideographs (with extensions and compatibility forms) and kana.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2FA1F}')
}

/// Text as written to the FTS table.
pub fn segment(text: &str) -> String {
    if !text.chars().any(is_cjk) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if is_cjk(c) {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Split one whitespace-delimited query word into FTS5 phrases: Latin runs
/// stay whole, CJK runs become space-separated single-character phrases.
pub fn query_phrases(word: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current = String::new();
    let mut in_cjk = false;

    let mut flush = |current: &mut String, in_cjk: bool| {
        if current.chars().any(char::is_alphanumeric) {
            let phrase = if in_cjk {
                current.chars().map(String::from).collect::<Vec<_>>().join(" ")
            } else {
                current.clone()
            };
            phrases.push(format!("\"{phrase}\""));
        }
        current.clear();
    };

    for c in word.chars().filter(|c| *c != '"') {
        let cjk = is_cjk(c);
        if cjk != in_cjk && !current.is_empty() {
            flush(&mut current, in_cjk);
        }
        in_cjk = cjk;
        current.push(c);
    }
    if !current.is_empty() {
        flush(&mut current, in_cjk);
    }
    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_text_is_untouched() {
        assert_eq!(segment("rust is fast"), "rust is fast");
    }

    #[test]
    fn cjk_characters_become_tokens() {
        assert_eq!(segment("喝咖啡"), " 喝  咖  啡 ");
        assert_eq!(segment("rust语言"), "rust 语  言 ");
    }

    #[test]
    fn mixed_words_split_into_phrases() {
        assert_eq!(query_phrases("咖啡"), vec!["\"咖 啡\""]);
        assert_eq!(query_phrases("rust语言"), vec!["\"rust\"", "\"语 言\""]);
        assert_eq!(query_phrases("茶"), vec!["\"茶\""]);
        assert!(query_phrases("--").is_empty());
    }
}
