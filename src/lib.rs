#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod backend;
pub mod errors;
pub mod graph;
pub mod renderable;
pub mod scene;
pub mod settings;

pub use backend::{DrawCommand, DrawRecipe, FrameEncoder, RecordingEncoder, WgpuFrameEncoder};
pub use errors::{Result, SchedulerError};
pub use graph::{
    BundleId, BundleState, ComputePass, EntryId, PassCategory, RenderBundleOptions,
    RenderPassDescriptor, RenderTarget, RenderTargetId,
};
pub use renderable::{FeedbackPlane, FullscreenPass, Mesh, Renderable, RenderableId, Transform};
pub use scene::Scene;
pub use settings::SchedulerSettings;
