pub mod features;
pub mod prediction;
pub mod signal;
pub mod tick;
