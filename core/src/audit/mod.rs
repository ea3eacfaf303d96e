pub mod changepoint;
pub mod discontinuity;
pub mod error;
pub mod monotonicity;
pub mod parallel;
pub mod pipeline;
pub mod results;
pub mod slopes;
pub mod types;
