//! Per-agent filesystem workspaces with path-containment enforcement.
//!
//! Each agent owns exactly one directory under a configured root; every file
//! operation the engine performs on that agent's behalf must resolve to a
//! path strictly inside it. Containment is checked on canonicalized paths,
//! so symlink escapes are refused along with `..` traversal.
//!
//! # Main types
//!
//! - [`AgentWorkspace`] — One agent's directory with contained file CRUD.

mod workspace;

pub use workspace::AgentWorkspace;
