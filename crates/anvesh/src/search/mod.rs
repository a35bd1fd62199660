pub mod filter;
pub mod fusion;
pub mod mmr;
pub mod planner;
pub mod text_search;

pub use filter::CoverageReport;
pub use fusion::reciprocal_rank_fusion;
pub use planner::{by_ids, neighbors, retrieve};
pub use text_search::{LexicalDoc, LexicalQueryPlan, TextSearch};
