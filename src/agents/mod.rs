//! Agent System
//!
//! The two model-backed stages every guideline job goes through:
//!
//! - **Summary Agent**: condenses the submitted guideline text
//! - **Checklist Agent**: turns that summary into ordered checklist items
//!
//! ## Pipeline Overview
//!
//! ```text
//! Guideline text
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Summary   │  → summary persisted on the job
//! │    Agent    │
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Checklist  │  → structured decode, line fallback
//! │    Agent    │
//! └─────────────┘
//!      │
//!      ▼
//!  Completed job
//! ```
//!
//! Sequencing, persistence and failure capture live in [`crate::pipeline`].

pub mod checklist;
pub mod summary;

pub use checklist::{ChecklistAgent, ChecklistParse};
pub use summary::SummaryAgent;
