//! Query matching over a single document
//!
//! Literal and regex queries are both compiled into one `regex::Regex`:
//! literal text is escaped first, so case-insensitive literal search gets the
//! regex engine's Unicode simple case folding instead of byte lowercasing.
//! Whole-word filtering is done here rather than with `\b`, so the same rule
//! applies to literal and regex queries and to replacement.

use regex::{Captures, Regex, RegexBuilder};

use crate::error::{EngineError, Result};
use crate::models::{MatchSpan, SearchOptions};

/// Global match budget shared by every file of one search
#[derive(Debug, Clone)]
pub struct MatchBudget {
    remaining: Option<usize>,
    exhausted: bool,
}

impl MatchBudget {
    /// `max_results == 0` means unlimited
    pub fn new(max_results: usize) -> Self {
        Self {
            remaining: (max_results > 0).then_some(max_results),
            exhausted: false,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Keep as many pre-located spans as the budget still allows
    pub fn admit(&mut self, spans: Vec<MatchSpan>) -> Vec<MatchSpan> {
        let mut kept = Vec::with_capacity(spans.len());
        for span in spans {
            if self.exhausted || !self.take() {
                break;
            }
            kept.push(span);
        }
        kept
    }

    /// Take one match from the budget; false once nothing is left
    fn take(&mut self) -> bool {
        match self.remaining.as_mut() {
            None => true,
            Some(0) => {
                self.exhausted = true;
                false
            }
            Some(n) => {
                *n -= 1;
                if *n == 0 {
                    self.exhausted = true;
                }
                true
            }
        }
    }
}

/// Compiled query
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
    literal: bool,
    whole_word: bool,
}

impl Matcher {
    /// Compile the query, failing before any scanning on empty or malformed input
    pub fn new(options: &SearchOptions) -> Result<Self> {
        if options.query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let pattern = if options.is_regex {
            options.query.clone()
        } else {
            regex::escape(&options.query)
        };

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!options.is_case_sensitive)
            .build()
            .map_err(|e| EngineError::InvalidPattern {
                pattern: options.query.clone(),
                message: e.to_string(),
            })?;

        log::debug!(
            "Compiled query '{}' (regex={}, case_sensitive={}, whole_word={})",
            options.query,
            options.is_regex,
            options.is_case_sensitive,
            options.match_whole_word
        );

        Ok(Self {
            regex,
            literal: !options.is_regex,
            whole_word: options.match_whole_word,
        })
    }

    /// Every retained match in one line, left to right
    ///
    /// After a zero-length match, or a candidate rejected by the whole-word
    /// rule, the scan resumes one character further on.
    fn captures_in<'h>(&self, line: &'h str) -> Vec<Captures<'h>> {
        let mut found = Vec::new();
        let mut pos = 0;

        while pos <= line.len() {
            let Some(caps) = self.regex.captures_at(line, pos) else {
                break;
            };
            let Some(m) = caps.get(0) else {
                break;
            };
            let (start, end) = (m.start(), m.end());

            let keep = !self.whole_word || is_word_bounded(line, start, end);
            pos = if keep && end > start {
                end
            } else {
                next_char_boundary(line, start)
            };

            if keep {
                found.push(caps);
            }
        }

        found
    }

    /// Byte ranges of every retained match in one line
    pub fn find_in_line(&self, line: &str) -> Vec<(usize, usize)> {
        self.captures_in(line)
            .iter()
            .filter_map(|caps| caps.get(0))
            .map(|m| (m.start(), m.end()))
            .collect()
    }

    pub fn is_match_line(&self, line: &str) -> bool {
        !self.captures_in(line).is_empty()
    }

    /// Scan a document, ordered by (line, column)
    ///
    /// Stops as soon as the shared budget runs out.
    pub fn scan(&self, lines: &[String], budget: &mut MatchBudget) -> Vec<MatchSpan> {
        let mut spans = Vec::new();

        'lines: for (line_idx, line) in lines.iter().enumerate() {
            for (i, (start, end)) in self.find_in_line(line).into_iter().enumerate() {
                if !budget.take() {
                    break 'lines;
                }
                spans.push(MatchSpan {
                    start_line: line_idx,
                    start_col: start,
                    end_line: line_idx,
                    end_col: end,
                    is_primary: i == 0,
                });
                if budget.is_exhausted() {
                    break 'lines;
                }
            }
        }

        spans
    }

    /// Substitute every retained match in a line
    ///
    /// Literal queries insert `replacement` verbatim (no case adjustment, no
    /// `$` expansion). Regex queries expand capture references.
    pub fn replace_line(&self, line: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut last = 0;

        for caps in self.captures_in(line) {
            let Some(m) = caps.get(0) else { continue };
            out.push_str(&line[last..m.start()]);
            if self.literal {
                out.push_str(replacement);
            } else {
                caps.expand(replacement, &mut out);
            }
            last = m.end();
        }

        out.push_str(&line[last..]);
        out
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_bounded(line: &str, start: usize, end: usize) -> bool {
    let before = line[..start].chars().next_back();
    let after = line[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

/// Byte index just past the character at `index` (or past the end)
fn next_char_boundary(line: &str, index: usize) -> usize {
    match line[index..].chars().next() {
        Some(c) => index + c.len_utf8(),
        None => line.len() + 1,
    }
}

/// Match results in the shapes a host search API may hand back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMatch {
    /// Explicit start/end coordinates
    Range {
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    },
    /// One line with any number of byte ranges inside it
    LineOffsets {
        line: usize,
        offsets: Vec<(usize, usize)>,
    },
    /// A preview snippet that starts `preview_col` bytes into `line`,
    /// with the highlight given relative to the snippet
    Preview {
        line: usize,
        preview_col: usize,
        highlight: (usize, usize),
    },
}

/// Convert host-supplied results into canonical spans sorted by (line, column)
pub fn normalize_host_matches(matches: Vec<HostMatch>) -> Vec<MatchSpan> {
    let mut spans: Vec<MatchSpan> = matches
        .into_iter()
        .flat_map(|m| match m {
            HostMatch::Range {
                start_line,
                start_col,
                end_line,
                end_col,
            } => vec![MatchSpan::new(start_line, start_col, end_line, end_col)],
            HostMatch::LineOffsets { line, offsets } => offsets
                .into_iter()
                .map(|(start, end)| MatchSpan::new(line, start, line, end))
                .collect(),
            HostMatch::Preview {
                line,
                preview_col,
                highlight,
            } => vec![MatchSpan::new(
                line,
                preview_col + highlight.0,
                line,
                preview_col + highlight.1,
            )],
        })
        .collect();

    spans.sort_by_key(|s| (s.start_line, s.start_col, s.end_line, s.end_col));
    spans.dedup_by_key(|s| (s.start_line, s.start_col, s.end_line, s.end_col));

    let mut previous_line = None;
    for span in &mut spans {
        span.is_primary = previous_line != Some(span.start_line);
        previous_line = Some(span.start_line);
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(query: &str) -> SearchOptions {
        SearchOptions::new(query)
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_case_insensitive_literal() {
        let matcher = Matcher::new(&options("Foo")).unwrap();
        let spans = matcher.scan(&lines("foo FOO fOo"), &mut MatchBudget::unlimited());
        assert_eq!(spans.len(), 3);
    }

    #[test]
    fn test_case_sensitive_literal() {
        let mut opts = options("Foo");
        opts.is_case_sensitive = true;
        let matcher = Matcher::new(&opts).unwrap();
        let spans = matcher.scan(&lines("foo FOO fOo"), &mut MatchBudget::unlimited());
        assert!(spans.is_empty());
    }

    #[test]
    fn test_case_insensitive_non_ascii() {
        let matcher = Matcher::new(&options("straße")).unwrap();
        assert_eq!(matcher.find_in_line("STRASSE Straße STRAßE").len(), 2);

        let matcher = Matcher::new(&options("ÉCOLE")).unwrap();
        assert_eq!(matcher.find_in_line("école"), vec![(0, 6)]);
    }

    #[test]
    fn test_whole_word() {
        let mut opts = options("cat");
        opts.match_whole_word = true;
        let matcher = Matcher::new(&opts).unwrap();
        let spans = matcher.scan(&lines("concatenate cat category"), &mut MatchBudget::unlimited());

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_col, 12);
        assert_eq!(spans[0].end_col, 15);
    }

    #[test]
    fn test_whole_word_retries_after_rejected_candidate() {
        let mut opts = options("aa");
        opts.match_whole_word = true;
        let matcher = Matcher::new(&opts).unwrap();
        assert_eq!(matcher.find_in_line("aaa aa"), vec![(4, 6)]);
    }

    #[test]
    fn test_whole_word_underscore_is_word_char() {
        let mut opts = options("id");
        opts.match_whole_word = true;
        let matcher = Matcher::new(&opts).unwrap();
        assert!(matcher.find_in_line("user_id").is_empty());
        assert_eq!(matcher.find_in_line("(id)"), vec![(1, 3)]);
    }

    #[test]
    fn test_regex_mode() {
        let mut opts = options(r"fo+\d");
        opts.is_regex = true;
        let matcher = Matcher::new(&opts).unwrap();
        assert_eq!(matcher.find_in_line("fooo1 fo2 f3"), vec![(0, 5), (6, 9)]);
    }

    #[test]
    fn test_literal_mode_escapes_metacharacters() {
        let matcher = Matcher::new(&options("a.b")).unwrap();
        assert!(matcher.find_in_line("axb").is_empty());
        assert_eq!(matcher.find_in_line("a.b"), vec![(0, 3)]);
    }

    #[test]
    fn test_invalid_pattern_fails_fast() {
        let mut opts = options("(unclosed");
        opts.is_regex = true;
        let err = Matcher::new(&opts).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_query_rejected() {
        assert_eq!(Matcher::new(&options("")).unwrap_err(), EngineError::EmptyQuery);
    }

    #[test]
    fn test_zero_length_matches_terminate() {
        let mut opts = options("x*");
        opts.is_regex = true;
        let matcher = Matcher::new(&opts).unwrap();
        let found = matcher.find_in_line("abé");
        // one empty match per character boundary
        assert_eq!(found, vec![(0, 0), (1, 1), (2, 2), (4, 4)]);
    }

    #[test]
    fn test_budget_is_global_and_stops_immediately() {
        let matcher = Matcher::new(&options("a")).unwrap();
        let mut budget = MatchBudget::new(3);

        let first = matcher.scan(&lines("a a\nb"), &mut budget);
        assert_eq!(first.len(), 2);
        assert!(!budget.is_exhausted());

        let second = matcher.scan(&lines("a a a\na"), &mut budget);
        assert_eq!(second.len(), 1);
        assert!(budget.is_exhausted());

        let third = matcher.scan(&lines("a"), &mut budget);
        assert!(third.is_empty());
    }

    #[test]
    fn test_budget_admits_prelocated_spans() {
        let mut budget = MatchBudget::new(2);
        let spans = (0..5).map(|l| MatchSpan::new(l, 0, l, 1)).collect();
        assert_eq!(budget.admit(spans).len(), 2);
        assert!(budget.is_exhausted());
        assert!(budget.admit(vec![MatchSpan::new(9, 0, 9, 1)]).is_empty());

        let mut unlimited = MatchBudget::unlimited();
        let spans = (0..5).map(|l| MatchSpan::new(l, 0, l, 1)).collect();
        assert_eq!(unlimited.admit(spans).len(), 5);
    }

    #[test]
    fn test_primary_flag_marks_first_match_per_line() {
        let matcher = Matcher::new(&options("o")).unwrap();
        let spans = matcher.scan(&lines("foo\nbar\no"), &mut MatchBudget::unlimited());
        let flags: Vec<_> = spans.iter().map(|s| (s.start_line, s.is_primary)).collect();
        assert_eq!(flags, vec![(0, true), (0, false), (2, true)]);
    }

    #[test]
    fn test_replace_literal_case_insensitive_is_verbatim() {
        let matcher = Matcher::new(&options("foo")).unwrap();
        assert_eq!(matcher.replace_line("Foo and foo", "bar"), "bar and bar");
        assert_eq!(matcher.replace_line("cost: $FOO", "$1"), "cost: $$1");
    }

    #[test]
    fn test_replace_regex_expands_captures() {
        let mut opts = options(r"(\w+)@(\w+)");
        opts.is_regex = true;
        let matcher = Matcher::new(&opts).unwrap();
        assert_eq!(
            matcher.replace_line("a@b and c@d", "$2.$1"),
            "b.a and d.c"
        );
    }

    #[test]
    fn test_replace_respects_whole_word() {
        let mut opts = options("cat");
        opts.match_whole_word = true;
        let matcher = Matcher::new(&opts).unwrap();
        assert_eq!(
            matcher.replace_line("concatenate cat category", "dog"),
            "concatenate dog category"
        );
    }

    #[test]
    fn test_normalize_host_matches() {
        let spans = normalize_host_matches(vec![
            HostMatch::Preview {
                line: 4,
                preview_col: 10,
                highlight: (2, 5),
            },
            HostMatch::LineOffsets {
                line: 1,
                offsets: vec![(6, 8), (0, 2)],
            },
            HostMatch::Range {
                start_line: 1,
                start_col: 0,
                end_line: 1,
                end_col: 2,
            },
        ]);

        let coords: Vec<_> = spans
            .iter()
            .map(|s| (s.start_line, s.start_col, s.end_col, s.is_primary))
            .collect();
        assert_eq!(
            coords,
            vec![(1, 0, 2, true), (1, 6, 8, false), (4, 12, 15, true)]
        );
    }
}
