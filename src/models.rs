//! Core data models used throughout ReadMate.
//!
//! These types represent the uploaded documents, the chapter sections cut
//! from them, and the digest handed to the query gateway.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::extract::ExtractError;

/// Maximum number of section titles embedded in a [`DocumentDigest`].
pub const DIGEST_MAX_SECTIONS: usize = 15;

/// Declared or inferred format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    EpubArchive,
}

impl DocumentFormat {
    /// Infers the format from a filename extension.
    ///
    /// Files without an extension are read as plain text.
    pub fn from_filename(name: &str) -> Result<Self, ExtractError> {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let ext = match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return Ok(DocumentFormat::PlainText),
        };
        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "epub" => Ok(DocumentFormat::EpubArchive),
            "txt" | "text" | "md" | "markdown" => Ok(DocumentFormat::PlainText),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::PlainText => "plain",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::EpubArchive => "epub",
        }
    }
}

impl FromStr for DocumentFormat {
    type Err = ExtractError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "txt" => Ok(DocumentFormat::PlainText),
            "pdf" => Ok(DocumentFormat::Pdf),
            "epub" => Ok(DocumentFormat::EpubArchive),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output language for prompts and the default section title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    /// Title given to text that precedes the first recognized heading.
    pub fn default_section_title(&self) -> &'static str {
        match self {
            Language::En => "Introduction",
            Language::Zh => "前言/开始",
        }
    }

    /// Language name used when asking the provider for output.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Zh => "Chinese",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "en" || lower.starts_with("en-") || lower.starts_with("en_") {
            Ok(Language::En)
        } else if lower == "zh" || lower.starts_with("zh-") || lower.starts_with("zh_") {
            Ok(Language::Zh)
        } else {
            Err(format!("unknown language '{}': expected en or zh", s))
        }
    }
}

impl<'de> serde::Deserialize<'de> for Language {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Uploaded bytes plus their format and display title. Never mutated.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub title: String,
    pub format: DocumentFormat,
    pub bytes: Arc<[u8]>,
}

impl RawDocument {
    pub fn new(title: impl Into<String>, format: DocumentFormat, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            title: title.into(),
            format,
            bytes: bytes.into(),
        }
    }

    /// Builds a document from an uploaded file name, inferring format and title.
    pub fn from_filename(name: &str, bytes: impl Into<Arc<[u8]>>) -> Result<Self, ExtractError> {
        let format = DocumentFormat::from_filename(name)?;
        Ok(Self::new(title_from_filename(name), format, bytes))
    }

    /// Hex SHA-256 of the raw bytes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Strips directories and the last extension from an upload name.
pub fn title_from_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

/// An ordered, titled slice of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterSection {
    pub index: usize,
    pub title: String,
    pub content: String,
}

/// Navigation entry exposed to presentation collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionHeading {
    pub index: usize,
    pub title: String,
}

impl From<&ChapterSection> for SectionHeading {
    fn from(section: &ChapterSection) -> Self {
        Self {
            index: section.index,
            title: section.title.clone(),
        }
    }
}

/// Bounded summary of a document: its title and leading section titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentDigest {
    pub title: String,
    pub section_titles: Vec<String>,
}

impl DocumentDigest {
    /// Returns `None` when the title is blank; there is nothing to describe.
    pub fn from_sections(title: &str, sections: &[ChapterSection]) -> Option<Self> {
        if title.trim().is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            section_titles: sections
                .iter()
                .take(DIGEST_MAX_SECTIONS)
                .map(|s| s.title.clone())
                .collect(),
        })
    }
}

impl fmt::Display for DocumentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Book: \"{}\". Structure: {}.",
            self.title,
            self.section_titles.join(" -> ")
        )
    }
}

/// A fully ingested document: the unit the library swaps atomically.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub id: Uuid,
    pub title: String,
    pub format: DocumentFormat,
    pub fingerprint: String,
    pub language: Language,
    pub text: String,
    pub sections: Vec<ChapterSection>,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedDocument {
    pub fn digest(&self) -> Option<DocumentDigest> {
        DocumentDigest::from_sections(&self.title, &self.sections)
    }

    pub fn navigation(&self) -> Vec<SectionHeading> {
        self.sections.iter().map(SectionHeading::from).collect()
    }

    pub fn section(&self, index: usize) -> Option<&ChapterSection> {
        self.sections.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(index: usize, title: &str) -> ChapterSection {
        ChapterSection {
            index,
            title: title.to_string(),
            content: String::new(),
        }
    }

    #[test]
    fn infers_format_from_extension() {
        assert_eq!(DocumentFormat::from_filename("a.PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(
            DocumentFormat::from_filename("dir/book.epub").unwrap(),
            DocumentFormat::EpubArchive
        );
        assert_eq!(
            DocumentFormat::from_filename("notes.md").unwrap(),
            DocumentFormat::PlainText
        );
        assert_eq!(
            DocumentFormat::from_filename("README").unwrap(),
            DocumentFormat::PlainText
        );
        assert!(matches!(
            DocumentFormat::from_filename("report.docx"),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn declared_tag_parsing() {
        assert_eq!("EPUB".parse::<DocumentFormat>().unwrap(), DocumentFormat::EpubArchive);
        assert_eq!("plain".parse::<DocumentFormat>().unwrap(), DocumentFormat::PlainText);
        assert!("mobi".parse::<DocumentFormat>().is_err());
    }

    #[test]
    fn title_drops_last_extension_only() {
        assert_eq!(title_from_filename("Deep.Work.pdf"), "Deep.Work");
        assert_eq!(title_from_filename("/tmp/books/Walden.epub"), "Walden");
        assert_eq!(title_from_filename(".hidden"), ".hidden");
    }

    #[test]
    fn language_parsing_accepts_region_suffix() {
        assert_eq!("zh-CN".parse::<Language>().unwrap(), Language::Zh);
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn digest_is_bounded_to_fifteen_titles() {
        let sections: Vec<_> = (0..20).map(|i| section(i, &format!("Chapter {}", i))).collect();
        let digest = DocumentDigest::from_sections("Walden", &sections).unwrap();
        assert_eq!(digest.section_titles.len(), DIGEST_MAX_SECTIONS);
        let rendered = digest.to_string();
        assert!(rendered.starts_with("Book: \"Walden\". Structure: Chapter 0 -> Chapter 1"));
        assert!(rendered.ends_with("Chapter 14."));
        assert!(!rendered.contains("Chapter 15"));
    }

    #[test]
    fn digest_requires_title() {
        assert!(DocumentDigest::from_sections("  ", &[section(0, "Intro")]).is_none());
    }
}
