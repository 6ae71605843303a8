pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod deriv;
pub mod error;
pub mod event;
pub mod export;
pub mod feature;
pub mod indicator;
pub mod input;
pub mod model;
pub mod predictor;
pub mod simulator;
