//! # Code Proof
//!
//! Evidence-backed question answering over a codebase.
//!
//! Code Proof ingests a project from an uploaded ZIP archive or a public
//! GitHub repository, normalizes it into an in-memory corpus, and answers
//! natural-language questions through a reasoning engine. Every claimed
//! reference is resolved back to the exact stored lines, so an answer always
//! carries verifiable proof.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌────────────┐
//! │ Connectors  │──▶│ Classify + │──▶│ FileCorpus │
//! │ ZIP/GitHub  │   │ Normalize  │   │ (session)  │
//! └─────────────┘   └────────────┘   └─────┬──────┘
//!                                          │
//!              ┌──────────────┬────────────┼─────────────┐
//!              ▼              ▼            ▼             ▼
//!         ┌─────────┐   ┌─────────┐  ┌──────────┐  ┌──────────┐
//!         │ Context │   │ Search  │  │ Resolver │  │   Tree   │
//!         │ +Engine │   │         │  │          │  │          │
//!         └─────────┘   └─────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cproof files --zip ./project.zip
//! cproof search "login" --repo https://github.com/owner/repo
//! cproof config set-key gsk_...
//! cproof ask "Where is authentication handled?" --zip ./project.zip
//! cproof serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`classify`] | Path classifier (code extensions, skipped directories) |
//! | [`connector_zip`] | ZIP archive connector |
//! | [`connector_github`] | GitHub repository connector |
//! | [`normalize`] | Shared root prefix stripping |
//! | [`context`] | Context window assembly |
//! | [`search`] | Line-level substring search |
//! | [`resolve`] | Reference resolution |
//! | [`tree`] | Directory tree |
//! | [`engine`] | Reasoning engine abstraction |
//! | [`store`] | History and settings persistence |
//! | [`session`] | Ingestion and question orchestration |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI subcommand implementations |
//! | [`traits`] | Connector extension trait |

pub mod classify;
pub mod commands;
pub mod config;
pub mod connector_github;
pub mod connector_zip;
pub mod context;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod resolve;
pub mod search;
pub mod server;
pub mod session;
pub mod store;
pub mod traits;
pub mod tree;
