//! Executes a pass plan against a scene.
//!
//! [`Baker`] brackets the run in a [`RenderSession`], resolves target
//! images through an [`ImageResolver`], lets a [`GraphRewirer`] expose the
//! targeted inputs of every material, calls the [`BakeEngine`] once per
//! pass, then either writes the baked images back into the graphs or rolls
//! the pass back.
mod engine;
mod images;
mod proxy;
mod rewire;
mod run;
mod state;

pub use engine::{BakeEngine, BakeError, SimulatedEngine};
pub use images::{ImageError, ImageResolver, PLACEHOLDER_IMAGE};
pub use proxy::ImageProxy;
pub use rewire::{GraphRewirer, MaterialBake, MaterialGraphState, PreparedTarget, RewireError};
pub use run::{BakeReport, BakeStatus, Baker};
pub use state::{ObjectState, RenderSession, RendererStateSnapshot, BAKE_ENGINE};
