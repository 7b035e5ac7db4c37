// Library exports for testing
// The binary (main.rs) imports these as well

pub mod demo;
pub mod error;
pub mod logger;
