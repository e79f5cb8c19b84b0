//! trellis-session: change tracking for one logical mapping session.
//!
//! The [`ChangeMemo`] fingerprints property state for change detection; the
//! [`MappingContext`] maps tracked objects to persisted identifiers and
//! recorded relationship state, and owns the memo. Both live exactly as
//! long as the session and are reset together between units of work.

pub mod context;
pub mod memo;

pub use context::{MappingContext, RelationshipRecord};
pub use memo::{fingerprint, ChangeMemo};
