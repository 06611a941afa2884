pub mod cfg;
pub mod common;
pub mod compile;
pub mod liveness;
pub mod passes;
