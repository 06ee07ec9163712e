pub mod example_repository;

pub use example_repository::{ExampleRepository, InMemoryExampleRepository};
