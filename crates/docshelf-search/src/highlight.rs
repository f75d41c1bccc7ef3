//! Highlight fragment construction.

use std::collections::HashSet;

pub const HIGHLIGHT_OPEN: &str = "<em>";
pub const HIGHLIGHT_CLOSE: &str = "</em>";

/// Char-index spans of alphanumeric runs in `chars`.
fn word_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in chars.iter().enumerate() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, chars.len()));
    }
    spans
}

/// Build up to `max_fragments` non-overlapping snippets of `content` around
/// words whose lowercased form is in `terms`, with matches wrapped in
/// `<em>`..`</em>` and `context` characters on each side.
pub fn highlight_fragments(
    content: &str,
    terms: &HashSet<String>,
    max_fragments: usize,
    context: usize,
) -> Vec<String> {
    if terms.is_empty() || max_fragments == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = content.chars().collect();
    let hits: Vec<(usize, usize)> = word_spans(&chars)
        .into_iter()
        .filter(|&(s, e)| {
            let word: String = chars[s..e].iter().collect();
            terms.contains(&word.to_lowercase())
        })
        .collect();

    let mut fragments = Vec::new();
    let mut covered_until = 0;

    for (i, &(start_hit, end_hit)) in hits.iter().enumerate() {
        if fragments.len() >= max_fragments {
            break;
        }
        if start_hit < covered_until {
            continue;
        }

        let start = start_hit.saturating_sub(context);
        let end = (end_hit + context).min(chars.len());

        let mut out = String::new();
        if start > 0 {
            out.push_str("...");
        }
        let mut pos = start;
        for &(hs, he) in hits[i..].iter().take_while(|&&(hs, he)| hs < end && he <= end) {
            out.extend(&chars[pos..hs]);
            out.push_str(HIGHLIGHT_OPEN);
            out.extend(&chars[hs..he]);
            out.push_str(HIGHLIGHT_CLOSE);
            pos = he;
        }
        out.extend(&chars[pos..end]);
        if end < chars.len() {
            out.push_str("...");
        }

        fragments.push(out);
        covered_until = end;
    }

    fragments
}
