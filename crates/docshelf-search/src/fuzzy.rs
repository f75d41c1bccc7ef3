//! Term matching for the in-process index: exact, prefix, and bounded
//! edit distance.

/// How a query term matched an indexed token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TermMatch {
    Exact,
    Prefix,
    Fuzzy(usize),
}

impl TermMatch {
    /// Score multiplier applied to the field weight.
    pub fn factor(&self) -> f32 {
        match self {
            TermMatch::Exact => 1.0,
            TermMatch::Prefix => 0.7,
            TermMatch::Fuzzy(1) => 0.5,
            TermMatch::Fuzzy(_) => 0.3,
        }
    }
}

/// Allowed edits for a term of `len` characters: 0 up to 2, 1 up to 5,
/// otherwise 2.
pub fn auto_fuzziness(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Levenshtein distance between `a` and `b` if it is at most `max`.
pub fn bounded_levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    if a.is_empty() || b.is_empty() {
        let d = a.len().max(b.len());
        return (d <= max).then_some(d);
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let d = prev[b.len()];
    (d <= max).then_some(d)
}

/// Match one lowercased query term against one lowercased token.
pub fn match_term(term: &str, token: &str) -> Option<TermMatch> {
    if term == token {
        return Some(TermMatch::Exact);
    }
    let term_len = term.chars().count();
    if term_len >= 2 && token.starts_with(term) {
        return Some(TermMatch::Prefix);
    }
    let max = auto_fuzziness(term_len);
    if max == 0 {
        return None;
    }
    bounded_levenshtein(term, token, max).map(TermMatch::Fuzzy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_fuzziness() {
        assert_eq!(auto_fuzziness(2), 0);
        assert_eq!(auto_fuzziness(3), 1);
        assert_eq!(auto_fuzziness(5), 1);
        assert_eq!(auto_fuzziness(6), 2);
    }

    #[test]
    fn test_bounded_levenshtein() {
        assert_eq!(bounded_levenshtein("kitten", "sitting", 3), Some(3));
        assert_eq!(bounded_levenshtein("kitten", "sitting", 2), None);
        assert_eq!(bounded_levenshtein("", "ab", 2), Some(2));
        assert_eq!(bounded_levenshtein("same", "same", 0), Some(0));
        assert_eq!(bounded_levenshtein("a", "abcdef", 2), None);
    }

    #[test]
    fn test_bounded_levenshtein_unicode() {
        assert_eq!(bounded_levenshtein("größe", "grösse", 2), Some(2));
    }

    #[test]
    fn test_match_term() {
        assert_eq!(match_term("enzyme", "enzyme"), Some(TermMatch::Exact));
        assert_eq!(match_term("enz", "enzymes"), Some(TermMatch::Prefix));
        assert_eq!(match_term("mitochondira", "mitochondria"), Some(TermMatch::Fuzzy(2)));
        assert_eq!(match_term("biolgy", "biology"), Some(TermMatch::Fuzzy(1)));
        // Short terms never match fuzzily.
        assert_eq!(match_term("ab", "ac"), None);
        assert_eq!(match_term("cell", "wall"), None);
    }

    #[test]
    fn test_factor_ordering() {
        assert!(TermMatch::Exact.factor() > TermMatch::Prefix.factor());
        assert!(TermMatch::Prefix.factor() > TermMatch::Fuzzy(1).factor());
        assert!(TermMatch::Fuzzy(1).factor() > TermMatch::Fuzzy(2).factor());
    }
}
