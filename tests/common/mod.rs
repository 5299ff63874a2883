#![allow(dead_code)]

pub mod fixture_server;
pub mod mock_executors;
pub mod strategies;

pub use fixture_server::*;
pub use mock_executors::*;
pub use strategies::*;
