//! Image optimization pipeline stages.
//!
//! - **discovery**: walk the source tree
//! - **hash**: content hashing and duplicate detection
//! - **metadata**: header-level dimension and colorspace probe
//! - **resize**: shrink oversized sources into the temp root
//! - **codec**: the encoder capability (cwebp or libwebp)
//! - **encode**: quality-ladder search under the byte cap
//! - **thumbnail**: responsive width variants
//! - **validate**: read-only audit of the output tree
//! - **optimizer**: drives a full run

pub mod codec;
pub mod discovery;
pub mod encode;
pub mod hash;
pub mod metadata;
pub mod optimizer;
pub mod resize;
pub mod thumbnail;
pub mod tools;
pub mod validate;

// Re-exports for convenient access
pub use codec::{Codec, CwebpCodec, EncodeRequest, NativeWebpCodec};
pub use discovery::{Discovered, FileDiscovery};
pub use encode::QualitySearchEncoder;
pub use hash::{DuplicateRegistry, Hasher};
pub use metadata::MetadataInspector;
pub use optimizer::{
    FileStatus, Optimizer, RunEvent, RunOptions, RunReport, RunState, Toolchain,
};
pub use resize::{fit_within, should_resize, Resizer};
pub use thumbnail::ThumbnailGenerator;
pub use tools::{check_dependencies, install_hint};
pub use validate::{OutputValidator, ValidationReport, ValidationStatus, REPORT_FILE};
