//! Brief management: directive analysis and the clarifying-question loop.
//!
//! A directive enters as free text and leaves as a [`FinalizedBrief`]: the
//! analysis pass classifies the project kind, extracts literal facts, states
//! default assumptions, and derives a deterministic list of clarifying
//! questions. Responses are recorded against stable question ids; once every
//! required question is answered the brief can be finalized. An unanswered
//! high-priority `agent_mismatch` question blocks workflow creation.
//!
//! Identical directives always yield identical question lists — tests and
//! the planner depend on this.
//!
//! # Main types
//!
//! - [`BriefManager`] — Holds brief state; analyze / respond / finalize.
//! - [`analysis::classify_kind`] — Directive → [`ProjectKind`] tag.
//!
//! [`FinalizedBrief`]: dirigent_core::FinalizedBrief
//! [`ProjectKind`]: dirigent_core::ProjectKind

/// Directive classification, fact extraction, and question synthesis.
pub mod analysis;
mod manager;

pub use manager::BriefManager;
