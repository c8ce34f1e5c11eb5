pub mod client;
pub mod collector;
pub mod concurrency_controller;
pub mod engine;
pub mod executor;
pub mod fixed_size_queue;
pub mod generator;
pub mod histogram;
pub mod monitor;
pub mod rate_limiter;
pub mod template;
pub mod validator;
pub mod worker;
