pub mod aggregator;
pub mod credential;
pub mod extractor;
pub mod github;
pub mod pipeline;
pub mod recency;
pub mod scheduler;

#[cfg(test)]
pub mod fake;
