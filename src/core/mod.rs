//! Core infrastructure shared by the pipeline stages.

pub mod lock;
pub mod output;
