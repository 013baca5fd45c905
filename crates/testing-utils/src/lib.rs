//! # MLQueue Testing Utils
//!
//! Shared testing utilities: in-memory mock implementations of every
//! repository trait plus builders for test data. Add as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! mlqueue-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
