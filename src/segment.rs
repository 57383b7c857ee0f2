//! Heading-driven chapter segmentation.
//!
//! Splits extracted text into ordered [`ChapterSection`]s in one linear pass
//! over `\n`-separated lines. A line is a heading when its trimmed form passes
//! the active [`HeadingRules`]; heading lines become section titles and are
//! removed from content. Every other line, blank ones included, is kept
//! verbatim, so joining the section contents with `\n` gives back the input
//! minus its heading lines.
//!
//! Text before the first heading goes into an implicit section titled with
//! the language's default ("Introduction"). That section is only emitted if
//! it holds at least one line, or if the document produced no other section.
//! Sections opened by a heading are always emitted, even when empty.

use crate::heading::HeadingRules;
use crate::models::{ChapterSection, Language};

/// Segments `text` with the standard heading rules.
pub fn segment(text: &str, language: Language) -> Vec<ChapterSection> {
    segment_with(text, language, &HeadingRules::standard())
}

/// Segments `text` with an explicit rule set. Never returns an empty list.
pub fn segment_with(text: &str, language: Language, rules: &HeadingRules) -> Vec<ChapterSection> {
    let mut sections = Vec::new();
    let mut title = language.default_section_title().to_string();
    let mut title_from_heading = false;
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let trimmed = line.trim();
        if rules.is_heading(trimmed) {
            if !buffer.is_empty() || title_from_heading {
                push_section(&mut sections, &title, &buffer);
            }
            buffer.clear();
            title = trimmed.to_string();
            title_from_heading = true;
        } else {
            buffer.push(line);
        }
    }

    if !buffer.is_empty() || title_from_heading || sections.is_empty() {
        push_section(&mut sections, &title, &buffer);
    }

    sections
}

fn push_section(sections: &mut Vec<ChapterSection>, title: &str, lines: &[&str]) {
    sections.push(ChapterSection {
        index: sections.len(),
        title: title.to_string(),
        content: lines.join("\n"),
    });
}
