mod error;
mod session_tests;
