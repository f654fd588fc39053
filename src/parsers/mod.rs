pub mod lcov;

pub use lcov::TraceReader;
