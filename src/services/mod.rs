pub mod example_service;

pub use example_service::{CreateExampleRequest, ExampleService, UpdateExampleRequest};
