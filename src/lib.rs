//! # arqlite
//!
//! Jena-style SPARQL algebra with conservative plan rewriting.
//!
//! The crate models query plans as immutable operator trees ([`algebra`])
//! and classifies the expressions appearing in them ([`classify`]). On top
//! of both sit rewrite passes that never change what a plan returns
//! ([`optimizer`]). The shipped pass eliminates variable assignments: an
//! assignment hidden behind a projection is removed when nothing references
//! it, or in-lined into its single use site when doing so cannot alter
//! results.

pub mod algebra;
pub mod classify;
pub mod optimizer;

// Re-export main types for convenience
pub use algebra::*;
pub use classify::*;
pub use optimizer::*;
