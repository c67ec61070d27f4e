//! Source loaders.
//!
//! Each loader produces a partial overlay from one backing source: the
//! captured process environment (optionally overlaid by dotenv files) and
//! the structured configuration file. Defaults come straight from the
//! schema. Overlays are merged into the target by the pipeline in fixed
//! precedence order; a layer only ever overwrites fields it explicitly
//! sets.

pub mod dotenv;
pub mod env;
pub mod file;
