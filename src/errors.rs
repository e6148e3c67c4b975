//! Error Types
//!
//! This module defines the error types used throughout the scheduler.
//!
//! # Overview
//!
//! Only conditions that would otherwise produce silently wrong output are
//! reported as [`SchedulerError`]:
//! - Render bundle descriptors that do not match their owning pass
//! - Operations on handles that are no longer registered
//! - Bundle membership requests the renderable cannot honour
//!
//! Developer mistakes that leave the frame graph consistent (mutating a ready
//! bundle, assigning an unknown output target, fallback routing) are logged
//! with `log::warn!` instead.
//!
//! ```rust,ignore
//! use pass_graph::errors::{Result, SchedulerError};
//!
//! fn build(scene: &mut Scene) -> Result<()> {
//!     let bundle = scene.create_render_bundle(options)?;
//!     scene.add_to_bundle(bundle, mesh)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::graph::{BundleId, EntryId, RenderTargetId};
use crate::renderable::RenderableId;

/// The main error type for the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    // ========================================================================
    // Render Bundle Errors
    // ========================================================================
    /// A render bundle declared attachment formats or a sample count that
    /// differ from the pass it would be drawn into.
    #[error("Render bundle `{bundle}` is incompatible with pass `{pass}`: {detail}")]
    BundleDescriptorMismatch {
        /// Bundle label
        bundle: String,
        /// Label of the owning pass
        pass: String,
        /// Which attribute differs
        detail: String,
    },

    /// The render bundle handle is not registered with the scene.
    #[error("Render bundle not found: {0:?}")]
    BundleNotFound(BundleId),

    /// The renderable does not expose the bundling capability.
    #[error("Renderable `{0}` cannot be batched into a render bundle")]
    NotBundleable(String),

    /// The renderable is already a member of another bundle.
    #[error("Renderable `{label}` already belongs to render bundle {bundle:?}")]
    AlreadyBundled {
        /// Renderable label
        label: String,
        /// Current owner
        bundle: BundleId,
    },

    /// The renderable exists but is not a member of the bundle.
    #[error("Renderable `{label}` is not a member of render bundle {bundle:?}")]
    NotBundleMember {
        /// Renderable label
        label: String,
        /// Bundle named by the caller
        bundle: BundleId,
    },

    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// The renderable handle is not registered with the scene.
    #[error("Renderable not found: {0:?}")]
    RenderableNotFound(RenderableId),

    /// The pass entry handle is not registered with the scene.
    #[error("Render pass entry not found: {0:?}")]
    EntryNotFound(EntryId),

    /// The render target handle is not registered with the scene.
    #[error("Render target not found: {0:?}")]
    RenderTargetNotFound(RenderTargetId),

    /// The default screen entry owns the swap chain and cannot be removed.
    #[error("The default screen pass entry cannot be removed")]
    DefaultEntryRemoval,
}

/// Alias for `Result<T, SchedulerError>`.
pub type Result<T> = std::result::Result<T, SchedulerError>;
