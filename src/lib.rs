//! # ReadMate
//!
//! Turns uploaded books into navigable chapters and asks a generative model
//! provider structured questions about them.
//!
//! ReadMate extracts plain text from PDF, EPUB and text uploads, cuts it into
//! titled sections with a set of heading rules, and keeps exactly one loaded
//! document per session. A schema-constrained gateway sends analysis,
//! discovery, refinement and reading-assist requests to the provider and
//! validates every reply against a declared shape before it is used.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Upload    │──▶│  Extract    │──▶│   Segment     │
//! │ PDF/EPUB/TXT│   │ pdf/zip/html│   │ heading rules │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │   Library    │ atomic swap
//!                                     └──────┬───────┘
//!                                            │ digest
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐        ┌─────────────┐   ┌──────────┐
//!                 │ CLI/HTTP │◀──────▶│   Gateway   │──▶│ Provider │
//!                 └──────────┘        │ + validate  │   │ Gemini/  │
//!                                     └─────────────┘   │ OpenAI   │
//!                                                       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! readmate chapters walden.epub          # list detected chapters
//! readmate digest walden.epub            # what the provider sees
//! readmate analyze --title "Walden" --intent "learn to live simply"
//! readmate serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`archive`] | Read-only archive index over EPUB containers |
//! | [`extract`] | Format-specific text extraction |
//! | [`heading`] | Heading detection rules |
//! | [`segment`] | Chapter segmentation |
//! | [`schema`] | Reply contracts and their schemas |
//! | [`validate`] | Sanitizing and validating provider replies |
//! | [`provider`] | Provider abstraction (Gemini, OpenAI-compatible) |
//! | [`gateway`] | Prompt building and fallback policy |
//! | [`library`] | Current document and atomic replacement |
//! | [`session`] | Library + gateway with result attribution |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI subcommand implementations |

pub mod archive;
pub mod commands;
pub mod config;
pub mod extract;
pub mod gateway;
pub mod heading;
pub mod library;
pub mod models;
pub mod provider;
pub mod schema;
pub mod segment;
pub mod server;
pub mod session;
pub mod validate;
