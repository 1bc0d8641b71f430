//! Profiling collaborator abstraction.
//!
//! The extraction core never talks to a database directly. All statistics
//! queries (row counts, distinct counts, samples, join validation) go through
//! the [`ProfilerProvider`] trait, which a dialect-specific adapter implements
//! behind the scenes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ProfilerProvider                           │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │  Metadata (async)          │  Statistics (async)          │  │
//! │  │  - list_tables()           │  - profile_column()          │  │
//! │  │  - get_table()             │  - value_overlap()           │  │
//! │  │                            │  - join_stats()              │  │
//! │  │                            │  - value_histogram()         │  │
//! │  │                            │  - completion_rates()        │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//!                SQL dialect adapter (external)
//! ```

mod error;
mod memory;
mod provider;
mod types;

pub use error::{ProfilerError, ProfilerResult};
pub use memory::InMemoryProfiler;
pub use provider::{ProfilerProvider, ProfilerProviderExt};
pub use types::*;

/// Maximum number of sample values a profile may carry.
pub const MAX_SAMPLE_VALUES: usize = 50;
