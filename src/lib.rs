//! # Ontomap
//!
//! An ontology extraction engine for relational databases: discovers
//! entities, infers relationships beyond declared foreign keys, classifies
//! every column's business meaning and produces a hierarchical summary for
//! downstream natural-language query tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  DetectionService                        │
//! │  (start/cancel, status, review decisions, summary)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [orchestrator]
//! ┌─────────────────────────────────────────────────────────┐
//! │              DAG (9 stages, strict order)                │
//! │    leadership lease + crash recovery + fingerprints      │
//! └─────────────────────────────────────────────────────────┘
//!            │                │                 │
//!            ▼                ▼                 ▼
//! ┌──────────────┐  ┌──────────────────┐  ┌──────────────┐
//! │  Workflow /  │  │  Classification  │  │ Relationship │
//! │ EntityTracker│  │  Pipeline (6 ph) │  │  Discovery   │
//! └──────────────┘  └──────────────────┘  └──────────────┘
//!            │                │                 │
//!            ▼                ▼                 ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │   ProfilerProvider · ModelClient · OntologyStore         │
//! │          (external collaborator contracts)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The profiler and model collaborators are abstract: dialect adapters and
//! the LLM transport live outside this crate.

pub mod classify;
pub mod config;
pub mod dag;
pub mod discovery;
pub mod llm;
pub mod profile;
pub mod service;
pub mod store;
pub mod workflow;

pub use dag::{Orchestrator, OrchestratorConfig};
pub use service::DetectionService;
pub use store::OntologyStore;
