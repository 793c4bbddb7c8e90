//! # register-weaver
//!
//! Build-time weaving of service registrars into a single collector class.
//!
//! ## Architecture
//!
//! - **classfile**: Class-file codec with constant interning and byte-identical re-serialization
//! - **capability**: Registrar and collector detection on parsed classes
//! - **registry**: Shared discovery state collected during the parallel scan
//! - **synth**: Synthesis and decoding of the collector's registration body
//! - **scan**: Class file discovery under directory units and file filters
//! - **catalog**: Archive scanning over memory-mapped jars
//! - **patch**: Temp-then-rename rewrite of a single archive entry
//! - **incremental**: Per-file and per-archive change statuses and the actions they map to
//! - **unit**: Input units handed over by the build host
//! - **manifest**: Build manifest loading and flavor filtering
//! - **output**: Destination allocation and file helpers
//! - **hooks**: Strategy trait for host-specific customization
//! - **transform**: The two-pass scan and rewrite
//! - **config**: Weaver configuration with file and env resolution

pub mod capability;
pub mod catalog;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod hooks;
pub mod incremental;
pub mod manifest;
pub mod output;
pub mod patch;
pub mod registry;
pub mod scan;
pub mod synth;
pub mod transform;
pub mod unit;
