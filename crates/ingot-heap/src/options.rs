//! Build options observed by the heap builder.

use ingot_meta::CompressEncoding;
use serde::{Deserialize, Serialize};

/// Global options the heap builder observes, set by the enclosing build
/// driver.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Store references as heap-base-relative offsets so the image heap can
    /// be mapped anywhere in a new isolate.
    pub spawn_isolates: bool,
    /// Debugging escape hatch: force every object into the writable
    /// reference partition.
    pub use_only_writable_heap: bool,
    pub print_heap_histogram: bool,
    pub print_partition_sizes: bool,
    pub compress: CompressEncoding,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            spawn_isolates: true,
            use_only_writable_heap: false,
            print_heap_histogram: false,
            print_partition_sizes: false,
            compress: CompressEncoding::default(),
        }
    }
}

impl BuildOptions {
    /// Whether references are emitted as compressed heap-base-relative
    /// offsets. Without a heap base every reference becomes a direct
    /// relocation instead.
    pub fn use_heap_base(&self) -> bool {
        self.spawn_isolates && self.compress.has_base
    }
}
