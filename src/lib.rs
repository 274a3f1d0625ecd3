pub mod capture;
pub mod chain;
pub mod config;
pub mod host;
pub mod pipeline;
pub mod tasks;

// wgpu host backend
pub mod gpu;
