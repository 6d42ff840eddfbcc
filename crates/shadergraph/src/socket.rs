use serde::{Deserialize, Serialize};

/// Data type carried by a node socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    Float,
    Int,
    Boolean,
    Vector,
    Color,
    Shader,
}

impl SocketKind {
    /// Number of image channels a bake of this socket occupies.
    pub fn channel_count(self) -> u8 {
        match self {
            Self::Float | Self::Int | Self::Boolean => 1,
            Self::Vector | Self::Color => 3,
            Self::Shader => 0,
        }
    }

    pub fn is_scalar(self) -> bool {
        self.channel_count() == 1
    }

    /// Shader closures cannot be rasterised into an image.
    pub fn is_bakeable(self) -> bool {
        self.channel_count() > 0
    }
}

/// Unlinked value stored on a socket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SocketValue {
    None,
    Float(f32),
    Int(i32),
    Bool(bool),
    Vector([f32; 3]),
    Color([f32; 4]),
}

impl Default for SocketValue {
    fn default() -> Self {
        Self::None
    }
}

impl SocketValue {
    pub fn default_for(kind: SocketKind) -> Self {
        match kind {
            SocketKind::Float => Self::Float(0.0),
            SocketKind::Int => Self::Int(0),
            SocketKind::Boolean => Self::Bool(false),
            SocketKind::Vector => Self::Vector([0.0; 3]),
            SocketKind::Color => Self::Color([0.0, 0.0, 0.0, 1.0]),
            SocketKind::Shader => Self::None,
        }
    }

    pub fn as_float(&self) -> f32 {
        match *self {
            Self::None => 0.0,
            Self::Float(v) => v,
            Self::Int(v) => v as f32,
            Self::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Vector([x, y, z]) => (x + y + z) / 3.0,
            Self::Color([r, g, b, _]) => (r + g + b) / 3.0,
        }
    }

    pub fn as_color(&self) -> [f32; 4] {
        match *self {
            Self::Vector([x, y, z]) => [x, y, z, 1.0],
            Self::Color(color) => color,
            Self::None => [0.0, 0.0, 0.0, 1.0],
            _ => {
                let v = self.as_float();
                [v, v, v, 1.0]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Socket {
    pub name: String,
    pub kind: SocketKind,
    #[serde(default)]
    pub default: SocketValue,
}

impl Socket {
    pub fn new(name: impl Into<String>, kind: SocketKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: SocketValue::default_for(kind),
        }
    }

    pub fn with_default(mut self, default: SocketValue) -> Self {
        self.default = default;
        self
    }
}
