//! # Context Pack
//!
//! Local context retrieval for AI tools: index a project's text files once,
//! then ask for the chunks most relevant to a question, packed to fit a
//! token budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ Discovery │──▶│ Chunk+Embed  │──▶│  SQLite  │
//! │  globs    │   │  (adapter)   │   │ sources/ │
//! └───────────┘   └──────────────┘   │  chunks  │
//!                                    └────┬─────┘
//!              ┌──────────────────────────┤
//!              ▼                          ▼
//!   search → rank → fit → format    ┌──────────┐
//!              │                    │   MCP    │
//!              ▼                    │  stdio   │
//!         ┌──────────┐              └──────────┘
//!         │   CLI    │
//!         │  (ctx)   │
//!         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctx init                          # create .ctx/config.toml and the index
//! ctx source add src ./src --include '**/*.rs'
//! ctx index                         # discover, chunk, embed, store
//! ctx select "where is the config loaded" --budget 4000
//! ctx serve                         # MCP tools over stdio
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | `.ctx/config.toml` parsing, validation and project paths |
//! | [`error`] | Error taxonomy, codes and payloads |
//! | [`models`] | Core data types |
//! | [`discovery`] | Glob-based file discovery |
//! | [`chunk`] | Line-window chunking |
//! | [`embedding`] | Embedding providers and adapter |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Sources, chunks and vectors |
//! | [`index`] | Indexing pipeline |
//! | [`search`] | Brute-force cosine search |
//! | [`rank`] | Bounded lexical boost ranking |
//! | [`budget`] | Greedy budget fitting and merging |
//! | [`format`] | Text and JSON rendering |
//! | [`select`] | Selection pipeline |
//! | [`status`] | Index status report |
//! | [`sources`] | Source management |
//! | [`mcp`] | MCP tool server |

pub mod budget;
pub mod chunk;
pub mod config;
pub mod db;
pub mod discovery;
pub mod embedding;
pub mod error;
pub mod format;
pub mod index;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod rank;
pub mod search;
pub mod select;
pub mod sources;
pub mod status;
pub mod store;
