//! Team knowledge base and resolver.
//!
//! ## Built-in sections
//!
//! | Section           | Keyword triggers                                   |
//! |-------------------|----------------------------------------------------|
//! | TeamOverview      | location, based, years                             |
//! | Chassis           | chassis, design process, intake, lift              |
//! | Programming       | programming                                        |
//! | FuturePlans       | future                                             |
//! | GameStrategy      | game strategy                                      |
//! | CommunityOutreach | outreach                                           |
//! | BusinessPlan      | business plan, mentors, new members, improvement   |
//!
//! Anything not reached through a trigger is still found by the fallback search.

mod resolver;
mod store;

pub use resolver::{render_value, search_value, Resolution, ResolutionSource};
pub use store::{KeywordBinding, KeywordEntry, KeywordTable, KnowledgeBase, BUILTIN_DOCUMENT};
