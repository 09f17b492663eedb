//! Lavender engine crate.
//!
//! A small forward renderer built around explicit frame pipelining: per-frame
//! constant arenas, a residency set, and a fence that keeps the CPU at most
//! `frames_in_flight` frames ahead of the GPU.

pub mod asset;
pub mod camera;
pub mod config;
pub mod core;
pub mod device;
pub mod engine;
pub mod input;
pub mod logging;
pub mod memory;
pub mod render;
pub mod scene;
pub mod time;
pub mod window;

pub use engine::Engine;
