//! In-process model of the scene a bake run operates on.
//!
//! Materials carry an arena-backed [`NodeGraph`]; every mutation the baker
//! makes goes through an [`EditJournal`] so it can be undone in reverse
//! order. Images are metadata only.
pub mod graph;
pub mod image;
pub mod journal;
pub mod node;
pub mod scene;
pub mod socket;

pub use graph::{GraphError, InputRef, Link, LinkId, NodeGraph, NodeId, OutputRef, RemovedNode};
pub use image::{ColorSpace, Image, ImageStore, ImageWrite};
pub use journal::{EditJournal, EditOp};
pub use node::{Node, NodeKind, SURFACE};
pub use scene::{
    Material, Object, ObjectKind, RenderEngine, RenderSettings, Scene, SceneError, UvLayer,
};
pub use socket::{Socket, SocketKind, SocketValue};
