pub mod allocator;
pub mod optimizer;
pub mod orchestrator;
pub mod projection;
pub mod selector;

pub use orchestrator::{build_plan, build_portfolio};
