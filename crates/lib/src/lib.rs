//! # Utility VM boot configuration
//!
//! This crate configures offline boot-configuration stores so that a
//! utility VM boots its guest from a composite-image filesystem exposed
//! over the virtual bus, and manages the activate/prepare lifecycle of
//! the content-addressable layers such an image is mounted against.
//!
//! The host tools doing the actual work (the boot-configuration editor,
//! the script host and the layer API) are driven as external commands.

pub mod cli;
pub mod config;
pub mod device;
pub mod layer;
pub mod mountspec;
pub mod sequence;
pub mod store;
pub mod tool;
pub mod vhd;
pub mod volume;
