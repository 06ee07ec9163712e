pub mod example;

pub use example::{Example, ExampleFilter, OrderDirection};
