//! Scene container: renderer settings, objects, materials and images.
//!
//! Types:
//! - `Scene`: everything a bake run reads and mutates, stored as JSON.
//! - `Object`: a mesh with material slots and UV layers.
//! - `Material`: a node tree whose `Surface` input is fed by an interface
//!   group node; the group's inputs are what gets baked.
//!
//! Functions:
//! - `Scene::from_json_str` / `Scene::to_json` for persistence.
//! - `Material::interface_node` to find the bakeable interface.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::{GraphError, InputRef, NodeGraph, NodeId, OutputRef};
use crate::image::ImageStore;
use crate::node::{Node, NodeKind, SURFACE};
use crate::socket::Socket;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to parse scene: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid scene: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderEngine {
    #[default]
    Eevee,
    Cycles,
    Workbench,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub engine: RenderEngine,
    #[serde(default = "default_use_clear")]
    pub use_clear: bool,
    #[serde(default = "default_margin")]
    pub margin: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            engine: RenderEngine::default(),
            use_clear: default_use_clear(),
            margin: default_margin(),
        }
    }
}

fn default_use_clear() -> bool {
    true
}

fn default_margin() -> u32 {
    16
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    #[default]
    Mesh,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvLayer {
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    #[serde(default)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub material_slots: Vec<String>,
    #[serde(default)]
    pub uv_layers: Vec<UvLayer>,
    #[serde(default)]
    pub hide_render: bool,
    #[serde(default)]
    pub selected: bool,
}

impl Object {
    pub fn mesh(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Mesh,
            material_slots: Vec::new(),
            uv_layers: Vec::new(),
            hide_render: false,
            selected: false,
        }
    }

    pub fn is_mesh(&self) -> bool {
        self.kind == ObjectKind::Mesh
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material_slots.push(material.into());
        self
    }

    /// Adds a UV layer; the first layer added becomes the active one.
    pub fn with_uv_layer(mut self, name: impl Into<String>) -> Self {
        let active = self.uv_layers.is_empty();
        self.uv_layers.push(UvLayer {
            name: name.into(),
            active,
        });
        self
    }

    /// Distinct materials in slot order.
    pub fn materials(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.material_slots
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn has_uv_layer(&self, name: &str) -> bool {
        self.uv_layers.iter().any(|layer| layer.name == name)
    }

    pub fn active_uv_layer(&self) -> Option<&str> {
        self.uv_layers
            .iter()
            .find(|layer| layer.active)
            .map(|layer| layer.name.as_str())
    }

    /// Marks `name` as the only active layer. Returns `false` when the layer
    /// does not exist, leaving the layers untouched.
    pub fn set_active_uv_layer(&mut self, name: &str) -> bool {
        if !self.has_uv_layer(name) {
            return false;
        }
        for layer in &mut self.uv_layers {
            layer.active = layer.name == name;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(default = "default_true")]
    pub use_nodes: bool,
    #[serde(default)]
    pub tree: NodeGraph,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_nodes: true,
            tree: NodeGraph::new(),
        }
    }

    /// A material whose output `Surface` is fed by an interface group with
    /// the given inputs.
    pub fn with_interface(
        name: impl Into<String>,
        group: impl Into<String>,
        inputs: Vec<Socket>,
    ) -> Result<Self, GraphError> {
        let mut material = Self::new(name);
        let output = material
            .tree
            .add_node(Node::material_output().at([300.0, 0.0]));
        let interface = material.tree.add_node(Node::group(group, inputs));
        material.tree.link(
            OutputRef::new(interface, "BSDF"),
            InputRef::new(output, SURFACE),
        )?;
        Ok(material)
    }

    pub fn output_node(&self) -> Option<NodeId> {
        self.tree
            .find_node(|node| node.kind == NodeKind::MaterialOutput)
    }

    /// The aggregation input sampled by the render engine.
    pub fn surface_input(&self) -> Option<InputRef> {
        self.output_node().map(|id| InputRef::new(id, SURFACE))
    }

    /// The group node feeding `Surface` through its first link.
    pub fn interface_node(&self) -> Option<NodeId> {
        let surface = self.surface_input()?;
        let links = self.tree.links_to(&surface);
        let (_, first) = links.first()?;
        let node = self.tree.node(first.from.node)?;
        (node.kind == NodeKind::Group).then_some(first.from.node)
    }

    pub fn interface_inputs(&self) -> Vec<&Socket> {
        self.interface_node()
            .and_then(|id| self.tree.node(id))
            .map(|node| node.inputs.iter().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub objects: Vec<Object>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub images: ImageStore,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, SceneError> {
        let scene: Scene = serde_json::from_str(input)?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects.iter().find(|object| object.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut Object> {
        self.objects.iter_mut().find(|object| object.name == name)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|material| material.name == name)
    }

    pub fn material_mut(&mut self, name: &str) -> Option<&mut Material> {
        self.materials
            .iter_mut()
            .find(|material| material.name == name)
    }

    pub fn selected_objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter().filter(|object| object.selected)
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        let mut objects = BTreeSet::new();
        for object in &self.objects {
            if object.name.trim().is_empty() {
                return Err(SceneError::Invalid("object name may not be empty".into()));
            }
            if !objects.insert(object.name.as_str()) {
                return Err(SceneError::Invalid(format!(
                    "duplicate object '{}'",
                    object.name
                )));
            }
        }

        let mut materials = BTreeSet::new();
        for material in &self.materials {
            if !materials.insert(material.name.as_str()) {
                return Err(SceneError::Invalid(format!(
                    "duplicate material '{}'",
                    material.name
                )));
            }
        }

        for object in &self.objects {
            for slot in &object.material_slots {
                if !materials.contains(slot.as_str()) {
                    return Err(SceneError::Invalid(format!(
                        "object '{}' references unknown material '{slot}'",
                        object.name
                    )));
                }
            }
            if object.uv_layers.iter().filter(|layer| layer.active).count() > 1 {
                return Err(SceneError::Invalid(format!(
                    "object '{}' has more than one active UV layer",
                    object.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::SocketKind;

    fn principled() -> Material {
        Material::with_interface(
            "Metal",
            "Principled",
            vec![
                Socket::new("Base Color", SocketKind::Color),
                Socket::new("Roughness", SocketKind::Float),
            ],
        )
        .unwrap()
    }

    #[test]
    fn interface_is_group_feeding_surface() {
        let material = principled();
        let interface = material.interface_node().unwrap();
        assert_eq!(material.tree.node(interface).unwrap().name, "Principled");
        let names: Vec<_> = material
            .interface_inputs()
            .iter()
            .map(|socket| socket.name.as_str())
            .collect();
        assert_eq!(names, vec!["Base Color", "Roughness"]);
    }

    #[test]
    fn non_group_upstream_has_no_interface() {
        let mut material = Material::new("Plain");
        let output = material.tree.add_node(Node::material_output());
        let emission = material.tree.add_node(Node::emission());
        material
            .tree
            .link(
                OutputRef::new(emission, "Emission"),
                InputRef::new(output, SURFACE),
            )
            .unwrap();
        assert!(material.interface_node().is_none());
        assert!(material.interface_inputs().is_empty());
    }

    #[test]
    fn active_uv_layer_is_exclusive() {
        let mut object = Object::mesh("Crate").with_uv_layer("UVMap").with_uv_layer("Lightmap");
        assert_eq!(object.active_uv_layer(), Some("UVMap"));
        assert!(object.set_active_uv_layer("Lightmap"));
        assert_eq!(object.active_uv_layer(), Some("Lightmap"));
        assert!(!object.set_active_uv_layer("Missing"));
        assert_eq!(object.active_uv_layer(), Some("Lightmap"));
    }

    #[test]
    fn scene_round_trips_through_json() {
        let mut scene = Scene::new();
        scene.materials.push(principled());
        scene
            .objects
            .push(Object::mesh("Crate").with_material("Metal").with_uv_layer("UVMap"));
        let json = scene.to_json().unwrap();
        let parsed = Scene::from_json_str(&json).unwrap();
        assert_eq!(parsed, scene);
    }

    #[test]
    fn rejects_unknown_material_slot() {
        let json = r#"{
            "objects": [{ "name": "Crate", "material_slots": ["Ghost"] }]
        }"#;
        let err = Scene::from_json_str(json).unwrap_err();
        assert!(matches!(err, SceneError::Invalid(msg) if msg.contains("Ghost")));
    }

    #[test]
    fn render_settings_default_when_missing() {
        let scene = Scene::from_json_str("{}").unwrap();
        assert_eq!(scene.render.engine, RenderEngine::Eevee);
        assert!(scene.render.use_clear);
        assert_eq!(scene.render.margin, 16);
    }

    #[test]
    fn object_kind_defaults_to_mesh() {
        let json = r#"{
            "objects": [
                { "name": "Crate" },
                { "name": "Lamp", "kind": "other" }
            ]
        }"#;
        let scene = Scene::from_json_str(json).unwrap();
        assert!(scene.object("Crate").unwrap().is_mesh());
        assert!(!scene.object("Lamp").unwrap().is_mesh());
    }
}
