//! # feedsift
//!
//! Feed ingestion with a relevance oracle and a resolve-once query ledger.
//!
//! feedsift pulls items from RSS/Atom sources, stores each one exactly once
//! per source, judges every new fetch against the open queries, and binds
//! each query to the first item that satisfies it.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ Scheduler │──▶│ Pipeline │──▶│ Sources      │──▶│  SQLite  │
//! │ interval  │   │ one run  │   │ RSS / Reddit │   │ items    │
//! └───────────┘   └────┬─────┘   └──────────────┘   │ records  │
//!                      │                            │ queries  │
//!                      ▼                            └────▲─────┘
//!                 ┌──────────┐   ┌──────────┐            │
//!                 │  Oracle  │──▶│  Parser  │────────────┘
//!                 └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sift init                                  # create database
//! sift query add "new Rust compiler release" # open a query
//! sift sync                                  # one run over all sources
//! sift results "new Rust compiler release"   # ranked matches
//! sift schedule --interval 30                # repeat every 30 minutes
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Fetch, oracle, and configuration errors |
//! | [`models`] | Items, queries, relevance records |
//! | [`codec`] | Timestamp serialization strategy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Deduplicating store and query ledger |
//! | [`sources`] | Source adapters and post-processing |
//! | [`oracle`] | Relevance oracle providers |
//! | [`prompts`] | Oracle prompt templates |
//! | [`parser`] | Oracle text → relevance record |
//! | [`pipeline`] | One run across all sources |
//! | [`scheduler`] | Repeated runs, retention, cancellation |
//! | [`stats`] | `sift stats` |
//! | [`results`] | `sift results` |
//! | [`queries`] | `sift query` |

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod oracle;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod queries;
pub mod results;
pub mod scheduler;
pub mod sources;
pub mod stats;
pub mod store;
