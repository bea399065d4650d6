//! Common types, traits, and error definitions for path_boost
//!
//! This module provides the foundational building blocks shared by
//! every stage of the path optimization pipeline.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
