// src/lib.rs

//! DHI adoption tracker library

pub mod error;
pub mod github;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod storage;
pub mod tracker;
pub mod utils;

pub use tracker::Tracker;
