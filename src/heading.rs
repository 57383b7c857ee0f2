//! Heading-candidate rules for chapter segmentation.
//!
//! Each [`HeadingRule`] recognizes one style of structural heading. A
//! [`HeadingRules`] set combines them with the shared length limit; the
//! segmenter only asks the set whether a trimmed line is a heading.
//!
//! | Rule | Matches |
//! |------|---------|
//! | [`MarkdownHeading`] | `# Title`, `## Title`, ... |
//! | [`LatinKeywordHeading`] | `Chapter 3`, `PART 2: ...`, `Section 十二` |
//! | [`CjkChapterHeading`] | `第一章`, `第 3 节`, `第十二回` |

use regex::Regex;
use std::sync::LazyLock;

/// Longest line (in characters) that can still be a heading.
pub const MAX_HEADING_CHARS: usize = 120;

/// Numerals accepted after a structural keyword.
const NUMERAL: &str = r"(?:\d+|[一二三四五六七八九十百千零〇两]+)";

static RE_MARKDOWN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#+\s+\S").unwrap());

static RE_LATIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:chapter|section|part)\s*{}\s*(?:章|节|部分|回|chapter|section|part)?",
        NUMERAL
    ))
    .unwrap()
});

static RE_CJK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^第\s*{}\s*(?:章|节|部分|回|卷|篇)?", NUMERAL)).unwrap()
});

/// One style of heading line.
pub trait HeadingRule: Send + Sync {
    /// Short identifier used in configuration and logs.
    fn name(&self) -> &'static str;

    /// Whether a trimmed, non-empty line has this rule's heading shape.
    fn matches(&self, line: &str) -> bool;
}

/// Markdown ATX headings: one or more `#`, whitespace, then text.
pub struct MarkdownHeading;

impl HeadingRule for MarkdownHeading {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn matches(&self, line: &str) -> bool {
        RE_MARKDOWN.is_match(line)
    }
}

/// `Chapter`/`Section`/`Part` followed by an Arabic or CJK numeral.
pub struct LatinKeywordHeading;

impl HeadingRule for LatinKeywordHeading {
    fn name(&self) -> &'static str {
        "latin"
    }

    fn matches(&self, line: &str) -> bool {
        RE_LATIN.is_match(line)
    }
}

/// `第` followed by a numeral and an optional unit word (`第三章`).
pub struct CjkChapterHeading;

impl HeadingRule for CjkChapterHeading {
    fn name(&self) -> &'static str {
        "cjk"
    }

    fn matches(&self, line: &str) -> bool {
        RE_CJK.is_match(line)
    }
}

/// Ordered set of heading rules plus the shared length limit.
pub struct HeadingRules {
    rules: Vec<Box<dyn HeadingRule>>,
}

impl HeadingRules {
    /// A set trying `rules` in order.
    pub fn new(rules: Vec<Box<dyn HeadingRule>>) -> Self {
        Self { rules }
    }

    /// Markdown, Latin keyword, and CJK chapter rules.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(MarkdownHeading),
            Box::new(LatinKeywordHeading),
            Box::new(CjkChapterHeading),
        ])
    }

    /// Builds a set from rule names (`markdown`, `latin`, `cjk`).
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut rules: Vec<Box<dyn HeadingRule>> = Vec::with_capacity(names.len());
        for name in names {
            match name.as_ref() {
                "markdown" => rules.push(Box::new(MarkdownHeading)),
                "latin" => rules.push(Box::new(LatinKeywordHeading)),
                "cjk" => rules.push(Box::new(CjkChapterHeading)),
                other => {
                    return Err(format!(
                        "unknown heading rule '{}': expected markdown, latin, or cjk",
                        other
                    ))
                }
            }
        }
        Ok(Self::new(rules))
    }

    /// Names of the active rules, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Whether `line` (already trimmed) is a heading candidate.
    pub fn is_heading(&self, line: &str) -> bool {
        let len = line.chars().count();
        if len == 0 || len > MAX_HEADING_CHARS {
            return false;
        }
        self.rules.iter().any(|rule| rule.matches(line))
    }
}

impl Default for HeadingRules {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_requires_space_and_text() {
        let rule = MarkdownHeading;
        assert!(rule.matches("# Intro"));
        assert!(rule.matches("### Deep dive"));
        assert!(!rule.matches("#hashtag"));
        assert!(!rule.matches("#   "));
        assert!(!rule.matches("Not # a heading"));
    }

    #[test]
    fn latin_keywords_need_a_numeral() {
        let rule = LatinKeywordHeading;
        assert!(rule.matches("Chapter 1"));
        assert!(rule.matches("CHAPTER 12: The Return"));
        assert!(rule.matches("part 3"));
        assert!(rule.matches("Section 二"));
        assert!(rule.matches("Chapter1"));
        assert!(!rule.matches("Chapter One"));
        assert!(!rule.matches("Chapters 4"));
        assert!(!rule.matches("In Chapter 4 we saw"));
    }

    #[test]
    fn cjk_chapter_markers() {
        let rule = CjkChapterHeading;
        assert!(rule.matches("第一章"));
        assert!(rule.matches("第 3 节 开端"));
        assert!(rule.matches("第十二回"));
        assert!(rule.matches("第二百零五章 终"));
        assert!(!rule.matches("第章"));
        assert!(!rule.matches("这是第一章"));
    }

    #[test]
    fn length_limit_is_inclusive_at_120_chars() {
        let rules = HeadingRules::standard();
        let at_limit = format!("Chapter 1 {}", "x".repeat(MAX_HEADING_CHARS - 10));
        assert_eq!(at_limit.chars().count(), 120);
        assert!(rules.is_heading(&at_limit));

        let over = format!("{}x", at_limit);
        assert_eq!(over.chars().count(), 121);
        assert!(!rules.is_heading(&over));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let rules = HeadingRules::standard();
        let line = format!("第一章{}", "字".repeat(100));
        assert!(line.len() > MAX_HEADING_CHARS);
        assert!(rules.is_heading(&line));
    }

    #[test]
    fn rule_sets_are_selectable_by_name() {
        let only_markdown = HeadingRules::from_names(&["markdown"]).unwrap();
        assert!(only_markdown.is_heading("# Title"));
        assert!(!only_markdown.is_heading("Chapter 1"));
        assert_eq!(HeadingRules::standard().names(), vec!["markdown", "latin", "cjk"]);
        assert!(HeadingRules::from_names(&["roman"]).is_err());
    }

    #[test]
    fn empty_line_is_never_a_heading() {
        assert!(!HeadingRules::standard().is_heading(""));
    }
}
