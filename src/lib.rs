//! # local-rag
//!
//! Three small services for a local retrieval pipeline, each a thin wrapper
//! over an existing library:
//!
//! ```text
//!  file upload ──▶ ┌──────────────┐
//!                  │ extract      │ ──▶ {"filename","type","length","text"}
//!                  │ POST /file   │     (pdf-extract, OCR, docx, txt, csv)
//!                  └──────────────┘
//!
//!  {"texts": [..]} ┌──────────────┐
//!            ────▶ │ embed        │ ──▶ {"vectors": [[..]]}
//!                  │ POST /embed  │     (fastembed, all-MiniLM-L6-v2)
//!                  └──────┬───────┘
//!                         │ HTTP
//!                  ┌──────┴───────┐     ┌──────────┐
//!                  │ loader       │ ──▶ │  Qdrant  │
//!                  │ (lrag load)  │     │ 384/cos  │
//!                  └──────────────┘     └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults |
//! | [`models`] | Request/response bodies |
//! | [`embedding`] | Embedding provider trait and local fastembed provider |
//! | [`extract`] | Per-format text extraction |
//! | [`ocr`] | OCR via an external executable |
//! | [`server`] | `/embed` and `/file` HTTP services |
//! | [`embed_client`] | Client for `/embed` with retry/backoff |
//! | [`qdrant`] | Qdrant REST client |
//! | [`loader`] | One-shot embed → upsert → search |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod embed_client;
pub mod embedding;
pub mod extract;
pub mod loader;
pub mod logging;
pub mod models;
pub mod ocr;
pub mod qdrant;
pub mod server;
