pub mod context;
pub mod effect;
pub mod host;
pub mod readback;
pub mod target;
