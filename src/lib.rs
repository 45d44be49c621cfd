//! Heap memory manager for multi-core audio DSP firmware.
//!
//! Memory is handed out from a small number of statically declared physical
//! regions, under real-time constraints: every operation is synchronous,
//! bounded in time, and never grows the heap. The cores don't snoop each
//! other's caches, so allocator metadata is kept coherent with explicit
//! cache maintenance supplied by the platform.
//!
//! See the [`heap`] module for the allocator itself, and the [`platform`]
//! module for the services a platform crate must provide.
//!
//! # Features
//!
//! * `host` (default): layout descriptions in TOML ([`config`]), and heaps
//!   backed by host memory ([`host`]) for tests and simulation. Firmware
//!   builds disable default features.
//! * `std`: link the standard library.

#![warn(missing_docs)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod heap;
pub mod platform;
pub mod sync;

#[cfg(feature = "host")]
pub mod config;
#[cfg(feature = "host")]
pub mod host;
