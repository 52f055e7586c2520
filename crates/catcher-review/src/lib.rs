//! Review engine for generated artifacts.
//!
//! Reviewer suggestions are applied to the markdown source with
//! whitespace-tolerant matching, shown as track changes over a view that is
//! always re-derived from that source, and walked one at a time by
//! [`ReviewSession`].

pub mod fuzzy;
pub mod render;
pub mod sections;
pub mod session;
pub mod view;

pub use fuzzy::{replace_once_flexible, Applied, Splice};
pub use render::{escape_html, markdown_to_html};
pub use sections::{split_sections, Section};
pub use session::{match_persona, Decision, ReviewPhase, ReviewSession, ReviewSummary};
pub use view::TrackedView;
