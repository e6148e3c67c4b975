//! Frame graph building blocks
//!
//! - [`RenderPassDescriptor`]: attachments and load operations of one pass
//! - [`RenderTarget`]: offscreen pass + output texture
//! - [`RenderPassEntry`]: one pass and what is drawn into it
//! - [`Stack`]: the four sorted buckets of an entry
//! - [`RenderBundle`]: static batch cache occupying one stack slot
//! - [`ComputeWork`]: dispatches encoded before any render pass

pub mod bundle;
pub mod compute;
pub mod entry;
pub mod pass;
pub mod stack;
pub mod target;

pub use bundle::{BundleId, BundleState, RenderBundle, RenderBundleOptions, aligned_capacity};
pub use compute::{ComputeId, ComputePass, ComputeWork};
pub use entry::{CopyBack, EntryContent, EntryId, LoadPolicy, PassCategory, RenderPassEntry, TextureSource};
pub use pass::{
    AttachmentView, ColorTarget, DepthTarget, LoadOp, PassId, PassLayout, RenderPassDescriptor,
};
pub use stack::{BucketKey, DrawableId, SortKey, Stack, compare_opaque, compare_transparent};
pub use target::{RenderTarget, RenderTargetId};
