//! User-visible build failures.
//!
//! There is no local recovery: any of these aborts the build and leaves
//! partial outputs undefined. Each message carries the offending object, its
//! type, and the multi-line reachability chain, because the root cause is
//! nearly always an accidental dependency introduced by host-side code
//! executed during the build.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    /// An object's type was not seen as instantiated during analysis.
    #[error(
        "image heap writing found an object whose class was not seen as instantiated during \
         static analysis. Did a static field or an object referenced from a static field change \
         during image generation? For example, a lazily initialized cache could have been \
         initialized during the build, in which case you need to force eager initialization \
         before analysis or reset the cache with a field value recomputation.\n  \
         object: {object} of class: {class}\n  reachable through:\n{chain}"
    )]
    NotInstantiated {
        object: String,
        class: String,
        chain: String,
    },

    /// A hub reached the heap without class-initialization info, meaning
    /// static analysis never saw the class. Many other objects are reachable
    /// from a hub, so this check protects against far more than missing
    /// initialization metadata.
    #[error(
        "image heap writing found a class not seen as instantiated during static analysis. Did a \
         static field or an object referenced from a static field change during image \
         generation?\n  class: {class}\n  reachable through:\n{chain}"
    )]
    HubMissingClassInit { class: String, chain: String },

    /// Emission found a reference whose target was never admitted: the
    /// source object mutated after analysis.
    #[error(
        "static field or an object referenced from a static field changed during image \
         generation\n  object: {object} of class: {class}\n  reachable through:\n{chain}"
    )]
    UnknownTarget {
        object: String,
        class: String,
        chain: String,
    },
}
