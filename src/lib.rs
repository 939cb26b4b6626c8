pub mod args;
pub mod error;
pub mod exec;
pub mod proxy;
pub mod relay;
