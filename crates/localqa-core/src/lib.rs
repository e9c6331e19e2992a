#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod traits;
pub mod transcript;
pub mod types;

pub use error::{Error, Result};
