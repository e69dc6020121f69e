//! Template Engine + Application Parser/Resolver + trait patch composition:
//! the rendering half of the pipeline between an
//! Application spec and the resource set the Dispatcher applies.

pub mod error;
pub mod patch;
pub mod plan;
pub mod render;
pub mod resolver;

pub use error::{Error, Result};
pub use plan::{ComponentRender, RenderPlan, RenderedResource, ResourceOrigin, StatusContext};
pub use render::{ProcessingClient, ReqwestProcessingClient, RenderContext, render_components};
pub use resolver::{ResolvedApplication, ResolvedComponent, ResolvedTrait, resolve};
