#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod resolver;
pub mod table;
