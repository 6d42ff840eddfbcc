use serde::{Deserialize, Serialize};

use crate::socket::{Socket, SocketKind, SocketValue};

/// Name of the material output input the render engine samples.
pub const SURFACE: &str = "Surface";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    MaterialOutput,
    Group,
    Value,
    Rgb,
    ImageTexture,
    UvMap,
    SeparateColor,
    CombineColor,
    DiffuseBsdf,
    TransparentBsdf,
    MixShader,
    Emission,
    Other,
}

/// A shader node. Socket names are unique per side of a node, so links
/// address sockets by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub inputs: Vec<Socket>,
    #[serde(default)]
    pub outputs: Vec<Socket>,
    #[serde(default)]
    pub location: [f32; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_map: Option<String>,
    #[serde(default)]
    pub select: bool,
}

impl Node {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            label: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            location: [0.0, 0.0],
            image: None,
            uv_map: None,
            select: false,
        }
    }

    pub fn material_output() -> Self {
        let mut node = Self::new(NodeKind::MaterialOutput, "Material Output");
        node.inputs = vec![
            Socket::new(SURFACE, SocketKind::Shader),
            Socket::new("Volume", SocketKind::Shader),
            Socket::new("Displacement", SocketKind::Vector),
        ];
        node
    }

    /// Interface group whose inputs are the bakeable material parameters.
    pub fn group(name: impl Into<String>, inputs: Vec<Socket>) -> Self {
        let name = name.into();
        let mut node = Self::new(NodeKind::Group, name.clone());
        node.label = Some(name);
        node.inputs = inputs;
        node.outputs = vec![Socket::new("BSDF", SocketKind::Shader)];
        node
    }

    pub fn value(value: f32) -> Self {
        let mut node = Self::new(NodeKind::Value, "Value");
        node.outputs =
            vec![Socket::new("Value", SocketKind::Float).with_default(SocketValue::Float(value))];
        node
    }

    pub fn rgb(color: [f32; 4]) -> Self {
        let mut node = Self::new(NodeKind::Rgb, "RGB");
        node.outputs =
            vec![Socket::new("Color", SocketKind::Color).with_default(SocketValue::Color(color))];
        node
    }

    pub fn image_texture(image: impl Into<String>) -> Self {
        let mut node = Self::new(NodeKind::ImageTexture, "Image Texture");
        node.image = Some(image.into());
        node.inputs = vec![Socket::new("Vector", SocketKind::Vector)];
        node.outputs = vec![
            Socket::new("Color", SocketKind::Color),
            Socket::new("Alpha", SocketKind::Float),
        ];
        node
    }

    pub fn uv_map(uv_map: impl Into<String>) -> Self {
        let mut node = Self::new(NodeKind::UvMap, "UV Map");
        node.uv_map = Some(uv_map.into());
        node.outputs = vec![Socket::new("UV", SocketKind::Vector)];
        node
    }

    pub fn separate_color() -> Self {
        let mut node = Self::new(NodeKind::SeparateColor, "Separate Color");
        node.inputs = vec![Socket::new("Color", SocketKind::Color)];
        node.outputs = vec![
            Socket::new("Red", SocketKind::Float),
            Socket::new("Green", SocketKind::Float),
            Socket::new("Blue", SocketKind::Float),
        ];
        node
    }

    pub fn combine_color() -> Self {
        let mut node = Self::new(NodeKind::CombineColor, "Combine Color");
        node.inputs = vec![
            Socket::new("Red", SocketKind::Float),
            Socket::new("Green", SocketKind::Float),
            Socket::new("Blue", SocketKind::Float),
        ];
        node.outputs = vec![Socket::new("Color", SocketKind::Color)];
        node
    }

    pub fn diffuse_bsdf() -> Self {
        let mut node = Self::new(NodeKind::DiffuseBsdf, "Diffuse BSDF");
        node.inputs = vec![
            Socket::new("Color", SocketKind::Color)
                .with_default(SocketValue::Color([0.8, 0.8, 0.8, 1.0])),
            Socket::new("Roughness", SocketKind::Float),
            Socket::new("Normal", SocketKind::Vector),
        ];
        node.outputs = vec![Socket::new("BSDF", SocketKind::Shader)];
        node
    }

    pub fn transparent_bsdf() -> Self {
        let mut node = Self::new(NodeKind::TransparentBsdf, "Transparent BSDF");
        node.inputs = vec![Socket::new("Color", SocketKind::Color)
            .with_default(SocketValue::Color([1.0, 1.0, 1.0, 1.0]))];
        node.outputs = vec![Socket::new("BSDF", SocketKind::Shader)];
        node
    }

    pub fn mix_shader() -> Self {
        let mut node = Self::new(NodeKind::MixShader, "Mix Shader");
        node.inputs = vec![
            Socket::new("Fac", SocketKind::Float).with_default(SocketValue::Float(0.5)),
            Socket::new("Shader A", SocketKind::Shader),
            Socket::new("Shader B", SocketKind::Shader),
        ];
        node.outputs = vec![Socket::new("Shader", SocketKind::Shader)];
        node
    }

    pub fn emission() -> Self {
        let mut node = Self::new(NodeKind::Emission, "Emission");
        node.inputs = vec![
            Socket::new("Color", SocketKind::Color)
                .with_default(SocketValue::Color([1.0, 1.0, 1.0, 1.0])),
            Socket::new("Strength", SocketKind::Float).with_default(SocketValue::Float(1.0)),
        ];
        node.outputs = vec![Socket::new("Emission", SocketKind::Shader)];
        node
    }

    pub fn at(mut self, location: [f32; 2]) -> Self {
        self.location = location;
        self
    }

    pub fn input(&self, name: &str) -> Option<&Socket> {
        self.inputs.iter().find(|socket| socket.name == name)
    }

    pub fn input_mut(&mut self, name: &str) -> Option<&mut Socket> {
        self.inputs.iter_mut().find(|socket| socket.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Socket> {
        self.outputs.iter().find(|socket| socket.name == name)
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}
