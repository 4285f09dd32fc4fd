#![allow(dead_code)]

pub mod distribution;
pub mod fixtures;
pub mod strategies;

pub use distribution::*;
pub use fixtures::*;
pub use strategies::*;
