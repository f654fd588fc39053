pub mod aggregate;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod html;
pub mod ingest;
pub mod model;
pub mod parsers;
pub mod render;
pub mod tree;
