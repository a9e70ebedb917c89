// Library interface for summariser modules
// This allows tests and other binaries to import modules

pub mod cache;
pub mod error;
pub mod extraction;
pub mod generation;
pub mod job_status;
pub mod model;
pub mod postprocess;
pub mod preprocess;
pub mod server;
pub mod service;
pub mod tasks;
