pub mod dispatch;
pub mod eligibility;
pub mod lifecycle;
pub mod queue;
