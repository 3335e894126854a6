use crate::models::{normalize, ExtractedPage};
use once_cell::sync::Lazy;
use regex::Regex;

/// `[[target]]` or `[[target|display]]`; the last capture is what a reader sees.
static LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]|]*)\]\]").unwrap());

/// Numeric character references, including ones whose `&` was escaped once more.
static NUMERIC_REF_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:amp;)?#[a-zA-Z0-9]*;").unwrap());

const CATEGORY_PREFIX: &str = "category:";
const MEDIA_PREFIXES: &[&str] = &["file:", "image:"];

#[derive(Clone, Copy, PartialEq, Eq)]
enum NamespacedLink {
    /// Dropped whole; the text after a pipe is a sort key.
    Category,
    /// Reduced to the caption after the last pipe, or dropped if there is none.
    Media,
}

pub fn clean_page(id: u64, title: &str, text: &str) -> ExtractedPage {
    ExtractedPage {
        id,
        title: normalize(title),
        text: clean_text(text),
    }
}

/// Structural cleanup of wikitext. Category links go away and file links keep
/// only their caption. Ordinary links collapse to their display text, numeric
/// character references are removed, and anything outside printable ASCII is
/// dropped.
pub fn clean_text(text: &str) -> String {
    let stripped = strip_namespaced_links(text);
    let linked = LINK_REGEX.replace_all(&stripped, "${1}");
    let unreferenced = NUMERIC_REF_REGEX.replace_all(&linked, "");
    unreferenced.chars().filter(|&c| is_kept(c)).collect()
}

fn is_kept(c: char) -> bool {
    c.is_ascii_graphic() || matches!(c, ' ' | '\n' | '\r' | '\t')
}

/// Handles `[[Category:…]]`, `[[File:…]]` and `[[Image:…]]` links, nested
/// brackets included (file captions often contain links of their own). An
/// opener with no matching `]]` is left as text.
fn strip_namespaced_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut run_start = 0;

    while i < bytes.len() {
        let kind = match bytes[i..].starts_with(b"[[") {
            true => namespaced_link(&bytes[i + 2..]),
            false => None,
        };
        let Some(kind) = kind else {
            i += 1;
            continue;
        };

        match link_end(bytes, i) {
            Some(end) => {
                result.push_str(&text[run_start..i]);
                if kind == NamespacedLink::Media {
                    result.push_str(&media_caption(&text[i + 2..end - 2]));
                }
                i = end;
                run_start = i;
            }
            None => i += 2,
        }
    }

    if run_start < bytes.len() {
        result.push_str(&text[run_start..]);
    }
    result
}

/// Byte offset just past the `]]` that closes the `[[` at `start`.
fn link_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"[[") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b"]]") {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

fn media_caption(inner: &str) -> String {
    let inner = strip_namespaced_links(inner);
    let reduced = LINK_REGEX.replace_all(&inner, "${1}");
    reduced
        .rsplit_once('|')
        .map(|(_, caption)| caption.to_string())
        .unwrap_or_default()
}

fn namespaced_link(rest: &[u8]) -> Option<NamespacedLink> {
    let start = rest.iter().take_while(|&&b| b == b' ').count();
    let rest = &rest[start..];
    let has_prefix = |prefix: &str| {
        rest.len() >= prefix.len() && rest[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    };
    if has_prefix(CATEGORY_PREFIX) {
        Some(NamespacedLink::Category)
    } else if MEDIA_PREFIXES.iter().any(|p| has_prefix(p)) {
        Some(NamespacedLink::Media)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_file_and_piped_link() {
        let text = "[[Category:Foo]] see [[File:x.png]] and [[Bar|Baz]]";
        assert_eq!(clean_text(text), " see  and Baz");
    }

    #[test]
    fn plain_link_keeps_target_text() {
        assert_eq!(clean_text("A [[Central processing unit]]."), "A Central processing unit.");
    }

    #[test]
    fn category_with_sort_key_is_dropped() {
        assert_eq!(clean_text("x[[Category:People|Smith, John]]y"), "xy");
    }

    #[test]
    fn file_link_keeps_its_caption() {
        assert_eq!(clean_text("x [[File:x.png|A caption]] y"), "x A caption y");
    }

    #[test]
    fn file_caption_with_nested_links_is_reduced() {
        let text = "Before [[File:Chip.jpg|thumb|A [[transistor]] on a [[wafer|die]]]] after";
        assert_eq!(clean_text(text), "Before A transistor on a die after");
    }

    #[test]
    fn category_inside_caption_is_dropped() {
        let text = "[[Image:a.png|left|Photo[[Category:Hidden]] here]]";
        assert_eq!(clean_text(text), "Photo here");
    }

    #[test]
    fn image_prefix_case_insensitive() {
        assert_eq!(clean_text("[[image:a.png]][[IMAGE:b.png]]ok"), "ok");
    }

    #[test]
    fn numeric_references_removed() {
        assert_eq!(clean_text("a&#160;b&amp;#8211;c&#x2014;d"), "abcd");
    }

    #[test]
    fn named_entities_are_left_alone() {
        assert_eq!(clean_text("Q&amp;A"), "Q&amp;A");
    }

    #[test]
    fn non_ascii_dropped_but_layout_kept() {
        assert_eq!(clean_text("Caf\u{e9}\tx\r\ny\u{7}z\u{2014}"), "Caf\tx\r\nyz");
    }

    #[test]
    fn unclosed_link_keeps_following_text() {
        let text = "Intro [[Category:Broken\n\nThe whole rest of the article body.";
        assert_eq!(clean_text(text), text);
    }

    #[test]
    fn closed_link_after_unclosed_one_is_still_handled() {
        let text = "[[File:broken.png|cap and [[Category:Real]] tail";
        assert_eq!(clean_text(text), "[[File:broken.png|cap and  tail");
    }

    #[test]
    fn ordinary_link_with_category_word_is_kept() {
        assert_eq!(clean_text("[[Categorical data|data]]"), "data");
    }

    #[test]
    fn clean_page_normalizes_title() {
        let page = clean_page(7, "Random_access_memory", "[[RAM]] [[Category:Memory]]");
        assert_eq!(page.id, 7);
        assert_eq!(page.title, "Random access memory");
        assert_eq!(page.text, "RAM ");
    }
}
