pub mod cache;
pub mod criteria;
pub mod diagnostic;
pub mod fetcher;
pub mod geo;
pub mod handlers;
pub mod jobs;
pub mod pipeline;
pub mod places;
pub mod ranking;
pub mod website;
pub mod worker;
