//! Relay page assembly.
//!
//! The script host loads one HTML document containing the host prelude,
//! the protocol libraries and the adapter script, in that order.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `assets` | Bundled templates and adapter script |
//! | `builder` | [`PageBuilder`], [`Page`], [`ScriptSource`] |

// ============================================================================
// Submodules
// ============================================================================

/// Bundled scripts and HTML templates.
pub mod assets;

/// Page assembly.
pub mod builder;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{Page, PageBuilder, ScriptSource};
