pub mod candidate;
pub mod criteria;
pub mod diagnostic;
pub mod job;
pub mod scan;
