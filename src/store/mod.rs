pub mod agents;
pub mod jobs;
pub mod offers;
pub mod positions;
