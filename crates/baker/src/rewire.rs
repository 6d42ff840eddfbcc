//! Per-material graph surgery around one bake call.
//!
//! `prepare` exposes the targeted interface inputs at the material output so
//! the render engine samples them, and makes the target image's sampler the
//! active node. Every edit goes into one of two journals:
//!
//! - the transient journal holds prep-only edits (constant proxies, channel
//!   routing, shading scaffold, rerouted `Surface`, active node). It is always
//!   rolled back once the bake call returns.
//! - the persistent journal holds the sampler, its UV selector and the
//!   channel write-back. It is committed after a successful bake and rolled
//!   back after a failed one.
//!
//! Nothing that existed before `prepare` is ever removed by either journal.
use bakeconfig::{BakeType, Channel, ChannelMask};
use scheduler::BakeInstruction;
use shadergraph::{
    EditJournal, GraphError, InputRef, Material, Node, NodeGraph, NodeId, OutputRef, SocketKind,
    SocketValue,
};
use tracing::{debug, warn};

use crate::proxy::ImageProxy;

const PASS_SPACING: f32 = 300.0;
const PROXY_OFFSET: f32 = 600.0;
const ROUTING_OFFSET: f32 = 200.0;

#[derive(Debug, thiserror::Error)]
pub enum RewireError {
    #[error("material '{0}' does not exist")]
    UnknownMaterial(String),
    #[error("material '{0}' does not use nodes")]
    NodesDisabled(String),
    #[error("material '{0}' has no material output node")]
    MissingOutput(String),
    #[error("material '{0}' has no interface group feeding its output")]
    MissingInterface(String),
    #[error("interface of material '{material}' has no input '{input}'")]
    MissingInput { material: String, input: String },
    #[error("scalar input '{input}' of material '{material}' needs exactly one channel, got {channels}")]
    ScalarChannels {
        material: String,
        input: String,
        channels: String,
    },
    #[error("material '{0}' targets more than one image in a single pass")]
    MixedImages(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// What fed the material output's `Surface` before the pass touched it.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialGraphState {
    pub material: String,
    pub surface: InputRef,
    pub original: Vec<OutputRef>,
}

impl MaterialGraphState {
    pub fn capture(material: &Material) -> Result<Self, RewireError> {
        let surface = material
            .surface_input()
            .ok_or_else(|| RewireError::MissingOutput(material.name.clone()))?;
        let original = material.tree.upstream(&surface);
        Ok(Self {
            material: material.name.clone(),
            surface,
            original,
        })
    }

    pub fn is_intact(&self, graph: &NodeGraph) -> bool {
        graph.upstream(&self.surface) == self.original
    }

    /// Reconnects every original upstream link if `Surface` drifted. Returns
    /// whether anything had to be repaired.
    pub fn ensure_restored(&self, graph: &mut NodeGraph) -> Result<bool, GraphError> {
        if self.is_intact(graph) {
            return Ok(false);
        }
        warn!(material = %self.material, "surface links drifted; reconnecting originals");
        let stale: Vec<_> = graph
            .links_to(&self.surface)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            graph.unlink(id)?;
        }
        for source in &self.original {
            graph.link(source.clone(), self.surface.clone())?;
        }
        Ok(true)
    }
}

/// A validated target of one material in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTarget {
    pub input: String,
    pub kind: SocketKind,
    pub channels: ChannelMask,
}

impl PreparedTarget {
    /// The single channel a scalar target reads back from.
    fn scalar_channel(&self) -> Option<Channel> {
        self.channels.iter().next().copied()
    }
}

/// One prepared material, owned by the baker until cleanup or rollback.
#[derive(Debug)]
pub struct MaterialBake {
    pub material: String,
    pub image: String,
    pub targets: Vec<PreparedTarget>,
    pub proxy: ImageProxy,
    pub warnings: Vec<String>,
    interface: Option<NodeId>,
    state: Option<MaterialGraphState>,
    transient: EditJournal,
    persistent: EditJournal,
}

impl MaterialBake {
    pub fn is_dummy(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn state(&self) -> Option<&MaterialGraphState> {
        self.state.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphRewirer {
    pub bake_type: BakeType,
    /// Pass position; only shifts where new nodes are placed.
    pub pass_index: usize,
}

impl GraphRewirer {
    pub fn new(bake_type: BakeType, pass_index: usize) -> Self {
        Self {
            bake_type,
            pass_index,
        }
    }

    /// Wires the real `instructions` of one material (all on `image`) for
    /// baking. On error the material is left exactly as it was.
    pub fn prepare(
        &self,
        material: &mut Material,
        image: &str,
        uv_map: Option<&str>,
        instructions: &[&BakeInstruction],
    ) -> Result<MaterialBake, RewireError> {
        if !material.use_nodes {
            return Err(RewireError::NodesDisabled(material.name.clone()));
        }
        let state = MaterialGraphState::capture(material)?;
        let interface = material
            .interface_node()
            .ok_or_else(|| RewireError::MissingInterface(material.name.clone()))?;
        let targets = self.validate_targets(material, interface, instructions)?;
        if targets.is_empty() {
            return self.prepare_dummy(material, image);
        }

        let anchor = self.anchor(&material.tree, interface);
        let mut transient = EditJournal::new();
        let mut persistent = EditJournal::new();
        let mut warnings = Vec::new();

        let result = ImageProxy::acquire(&mut material.tree, &mut persistent, image, uv_map, anchor)
            .map_err(RewireError::from)
            .and_then(|proxy| {
                self.route(
                    &mut material.tree,
                    &mut transient,
                    interface,
                    &targets,
                    &state.surface,
                    anchor,
                    &mut warnings,
                )?;
                proxy.activate(&mut material.tree, &mut transient)?;
                Ok(proxy)
            });

        match result {
            Ok(proxy) => {
                debug!(
                    material = %material.name,
                    image,
                    targets = targets.len(),
                    edits = transient.len() + persistent.len(),
                    "prepared material"
                );
                for warning in &warnings {
                    warn!(material = %material.name, "{warning}");
                }
                Ok(MaterialBake {
                    material: material.name.clone(),
                    image: image.to_string(),
                    targets,
                    proxy,
                    warnings,
                    interface: Some(interface),
                    state: Some(state),
                    transient,
                    persistent,
                })
            }
            Err(err) => {
                transient.rollback(&mut material.tree);
                persistent.rollback(&mut material.tree);
                Err(err)
            }
        }
    }

    /// Gives a material without a real target an active sampler on the
    /// placeholder image. Nothing is rerouted and the sampler is removed
    /// again on cleanup.
    pub fn prepare_dummy(
        &self,
        material: &mut Material,
        placeholder: &str,
    ) -> Result<MaterialBake, RewireError> {
        if !material.use_nodes {
            return Err(RewireError::NodesDisabled(material.name.clone()));
        }
        let anchor = material
            .interface_node()
            .map(|interface| self.anchor(&material.tree, interface))
            .unwrap_or([0.0, -PASS_SPACING * self.pass_index as f32]);

        let mut transient = EditJournal::new();
        let result = ImageProxy::acquire(&mut material.tree, &mut transient, placeholder, None, anchor)
            .and_then(|proxy| {
                proxy.activate(&mut material.tree, &mut transient)?;
                Ok(proxy)
            });
        match result {
            Ok(proxy) => {
                debug!(material = %material.name, image = placeholder, "prepared dummy material");
                Ok(MaterialBake {
                    material: material.name.clone(),
                    image: placeholder.to_string(),
                    targets: Vec::new(),
                    proxy,
                    warnings: Vec::new(),
                    interface: None,
                    state: None,
                    transient,
                    persistent: EditJournal::new(),
                })
            }
            Err(err) => {
                transient.rollback(&mut material.tree);
                Err(err.into())
            }
        }
    }

    /// After a successful bake: drops prep-only nodes, restores `Surface`,
    /// and feeds each target input from the baked image. Returns warnings.
    pub fn cleanup_pass(
        &self,
        material: &mut Material,
        mut bake: MaterialBake,
    ) -> Result<Vec<String>, RewireError> {
        let graph = &mut material.tree;
        let mut warnings = Vec::new();
        for failure in bake.transient.rollback(graph) {
            warnings.push(format!(
                "material '{}': failed to remove bake scaffolding: {failure}",
                bake.material
            ));
        }

        let (Some(interface), Some(state)) = (bake.interface, bake.state.as_ref()) else {
            // Dummy samplers never outlive the pass.
            bake.persistent.rollback(graph);
            return Ok(warnings);
        };
        state.ensure_restored(graph)?;

        if let Err(err) = self.write_back(graph, &mut bake, interface, &mut warnings) {
            bake.persistent.rollback(graph);
            return Err(err);
        }
        bake.persistent.commit();
        debug!(material = %bake.material, image = %bake.image, "wrote back baked image");
        Ok(warnings)
    }

    /// After a failed bake: removes everything `prepare` created and puts
    /// `Surface` back. Failures are returned, not raised.
    pub fn rollback(&self, material: &mut Material, mut bake: MaterialBake) -> Vec<GraphError> {
        let graph = &mut material.tree;
        let mut failures = bake.transient.rollback(graph);
        failures.extend(bake.persistent.rollback(graph));
        if let Some(state) = &bake.state {
            if let Err(err) = state.ensure_restored(graph) {
                failures.push(err);
            }
        }
        debug!(material = %bake.material, failures = failures.len(), "rolled back material");
        failures
    }

    fn anchor(&self, graph: &NodeGraph, interface: NodeId) -> [f32; 2] {
        let location = graph
            .node(interface)
            .map(|node| node.location)
            .unwrap_or_default();
        [
            location[0],
            location[1] - PASS_SPACING * (self.pass_index as f32 + 1.0),
        ]
    }

    fn validate_targets(
        &self,
        material: &Material,
        interface: NodeId,
        instructions: &[&BakeInstruction],
    ) -> Result<Vec<PreparedTarget>, RewireError> {
        let node = material
            .tree
            .node(interface)
            .ok_or_else(|| RewireError::MissingInterface(material.name.clone()))?;

        let mut targets = Vec::new();
        for instruction in instructions {
            let Some(target) = &instruction.target else {
                continue;
            };
            if node.input(&target.input).is_none() {
                return Err(RewireError::MissingInput {
                    material: material.name.clone(),
                    input: target.input.clone(),
                });
            }
            if target.kind.is_scalar() && instruction.channels.len() != 1 {
                return Err(RewireError::ScalarChannels {
                    material: material.name.clone(),
                    input: target.input.clone(),
                    channels: bakeconfig::mask_label(&instruction.channels),
                });
            }
            targets.push(PreparedTarget {
                input: target.input.clone(),
                kind: target.kind,
                channels: instruction.channels.clone(),
            });
        }
        Ok(targets)
    }

    /// Source output for one target: whatever feeds the input, or a new
    /// constant node holding its current default.
    fn source(
        &self,
        graph: &mut NodeGraph,
        journal: &mut EditJournal,
        interface: NodeId,
        target: &PreparedTarget,
        location: [f32; 2],
    ) -> Result<OutputRef, RewireError> {
        let input = InputRef::new(interface, target.input.as_str());
        if let Some(upstream) = graph.upstream(&input).into_iter().next() {
            return Ok(upstream);
        }

        let default = graph
            .node(interface)
            .and_then(|node| node.input(&target.input))
            .map(|socket| socket.default)
            .unwrap_or(SocketValue::None);
        let (node, socket) = if target.kind.is_scalar() {
            (Node::value(default.as_float()), "Value")
        } else {
            (Node::rgb(default.as_color()), "Color")
        };
        let id = journal.add_node(graph, node.at(location));
        Ok(OutputRef::new(id, socket))
    }

    #[allow(clippy::too_many_arguments)]
    fn route(
        &self,
        graph: &mut NodeGraph,
        journal: &mut EditJournal,
        interface: NodeId,
        targets: &[PreparedTarget],
        surface: &InputRef,
        anchor: [f32; 2],
        warnings: &mut Vec<String>,
    ) -> Result<(), RewireError> {
        let mut sources = Vec::with_capacity(targets.len());
        for (row, target) in targets.iter().enumerate() {
            let location = [anchor[0] - PROXY_OFFSET, anchor[1] - 120.0 * row as f32];
            sources.push(self.source(graph, journal, interface, target, location)?);
        }

        let routing = [anchor[0] + ROUTING_OFFSET, anchor[1]];
        let mut alpha = None;
        let composed = match (targets, sources.as_slice()) {
            ([target], [source]) if !target.kind.is_scalar() && is_full_colour(&target.channels) => {
                if target.channels.contains(&Channel::A) {
                    warnings.push(format!(
                        "input '{}' is a colour and carries no alpha; channel A left untouched",
                        target.input
                    ));
                }
                source.clone()
            }
            _ => {
                let combine = journal.add_node(graph, Node::combine_color().at(routing));
                for (target, source) in targets.iter().zip(&sources) {
                    if target.kind.is_scalar() {
                        match target.scalar_channel().and_then(Channel::component) {
                            Some(component) => {
                                journal.link(
                                    graph,
                                    source.clone(),
                                    InputRef::new(combine, component),
                                )?;
                            }
                            None if alpha.is_none() => alpha = Some(source.clone()),
                            None => warnings.push(format!(
                                "input '{}' ignored: channel A is already taken",
                                target.input
                            )),
                        }
                        continue;
                    }

                    let separate = journal.add_node(
                        graph,
                        Node::separate_color().at([routing[0] - ROUTING_OFFSET / 2.0, routing[1]]),
                    );
                    journal.link(graph, source.clone(), InputRef::new(separate, "Color"))?;
                    for channel in colour_channels(&target.channels) {
                        if let Some(component) = channel.component() {
                            journal.link(
                                graph,
                                OutputRef::new(separate, component),
                                InputRef::new(combine, component),
                            )?;
                        }
                    }
                    if target.channels.contains(&Channel::A) {
                        warnings.push(format!(
                            "input '{}' is a colour and carries no alpha; channel A left untouched",
                            target.input
                        ));
                    }
                }
                OutputRef::new(combine, "Color")
            }
        };

        journal.unlink_input(graph, surface)?;
        match self.bake_type {
            BakeType::Emit => {
                if alpha.is_some() {
                    warnings.push(
                        "alpha can only be captured by a diffuse bake; channel A dropped".into(),
                    );
                }
                journal.link(graph, composed, surface.clone())?;
            }
            BakeType::Diffuse => {
                let at = [routing[0] + ROUTING_OFFSET, routing[1]];
                let diffuse = journal.add_node(graph, Node::diffuse_bsdf().at(at));
                let transparent = journal.add_node(
                    graph,
                    Node::transparent_bsdf().at([at[0], at[1] + 150.0]),
                );
                let mut mix = Node::mix_shader().at([at[0] + ROUTING_OFFSET, at[1]]);
                if let Some(fac) = mix.input_mut("Fac") {
                    fac.default = SocketValue::Float(1.0);
                }
                let mix = journal.add_node(graph, mix);

                journal.link(graph, composed, InputRef::new(diffuse, "Color"))?;
                if let Some(alpha) = alpha {
                    journal.link(graph, alpha, InputRef::new(mix, "Fac"))?;
                }
                journal.link(
                    graph,
                    OutputRef::new(transparent, "BSDF"),
                    InputRef::new(mix, "Shader A"),
                )?;
                journal.link(
                    graph,
                    OutputRef::new(diffuse, "BSDF"),
                    InputRef::new(mix, "Shader B"),
                )?;
                journal.link(graph, OutputRef::new(mix, "Shader"), surface.clone())?;
            }
        }
        Ok(())
    }

    fn write_back(
        &self,
        graph: &mut NodeGraph,
        bake: &mut MaterialBake,
        interface: NodeId,
        warnings: &mut Vec<String>,
    ) -> Result<(), RewireError> {
        for target in &bake.targets {
            let channel = if target.kind.is_scalar() {
                target.scalar_channel()
            } else {
                None
            };
            if channel == Some(Channel::A) && self.bake_type == BakeType::Emit {
                warnings.push(format!(
                    "material '{}': input '{}' keeps its links; an emit bake cannot write alpha",
                    bake.material, target.input
                ));
                continue;
            }

            let read = bake
                .proxy
                .channel_output(graph, &mut bake.persistent, channel)?;
            let input = InputRef::new(interface, target.input.as_str());
            bake.persistent.unlink_input(graph, &input)?;
            bake.persistent.link(graph, read, input)?;
        }
        Ok(())
    }
}

fn is_full_colour(mask: &ChannelMask) -> bool {
    let colour = colour_channels(mask);
    colour.len() == 3
}

/// Red/green/blue part of a mask; an empty mask means all three.
fn colour_channels(mask: &ChannelMask) -> Vec<Channel> {
    if mask.is_empty() {
        return vec![Channel::R, Channel::G, Channel::B];
    }
    mask.iter()
        .copied()
        .filter(|channel| channel.component().is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler::{BakeTarget, ImageDescriptor};
    use shadergraph::{NodeKind, Socket, SURFACE};

    struct Fixture {
        material: Material,
        interface: NodeId,
        upstream: NodeId,
    }

    /// Roughness is driven by a value node, everything else is unlinked.
    fn fixture() -> Fixture {
        let mut material = Material::with_interface(
            "Metal",
            "Principled",
            vec![
                Socket::new("Base Color", SocketKind::Color)
                    .with_default(SocketValue::Color([0.5, 0.25, 0.125, 1.0])),
                Socket::new("Roughness", SocketKind::Float),
                Socket::new("Metallic", SocketKind::Float)
                    .with_default(SocketValue::Float(0.75)),
            ],
        )
        .unwrap();
        let interface = material.interface_node().unwrap();
        let upstream = material.tree.add_node(Node::value(0.3));
        material
            .tree
            .link(
                OutputRef::new(upstream, "Value"),
                InputRef::new(interface, "Roughness"),
            )
            .unwrap();
        Fixture {
            material,
            interface,
            upstream,
        }
    }

    fn instruction(input: &str, kind: SocketKind, channels: &[Channel]) -> BakeInstruction {
        BakeInstruction {
            material: "Metal".into(),
            target: Some(BakeTarget {
                input: input.into(),
                kind,
            }),
            uv_map: Some("UVMap".into()),
            channels: channels.iter().copied().collect(),
            image: ImageDescriptor::Existing { name: "ORM".into() },
            margin: 16,
            preset: "Packed".into(),
        }
    }

    fn surface_sources(material: &Material) -> Vec<OutputRef> {
        material.tree.upstream(&material.surface_input().unwrap())
    }

    #[test]
    fn rollback_restores_graph_exactly() {
        let Fixture {
            mut material,
            interface,
            upstream,
        } = fixture();
        let before_surface = surface_sources(&material);
        let before_nodes = material.tree.node_count();
        let before_links = material.tree.link_count();

        let rewirer = GraphRewirer::new(BakeType::Diffuse, 0);
        let rough = instruction("Roughness", SocketKind::Float, &[Channel::G]);
        let metal = instruction("Metallic", SocketKind::Float, &[Channel::A]);
        let bake = rewirer
            .prepare(&mut material, "ORM", Some("UVMap"), &[&rough, &metal])
            .unwrap();
        assert_ne!(surface_sources(&material), before_surface);
        assert_eq!(material.tree.active(), Some(bake.proxy.sampler));

        let failures = rewirer.rollback(&mut material, bake);
        assert!(failures.is_empty());
        assert_eq!(surface_sources(&material), before_surface);
        assert_eq!(
            material.tree.upstream(&InputRef::new(interface, "Roughness")),
            vec![OutputRef::new(upstream, "Value")]
        );
        assert_eq!(material.tree.node_count(), before_nodes);
        assert_eq!(material.tree.link_count(), before_links);
        assert!(material.tree.active().is_none());
    }

    #[test]
    fn cleanup_feeds_input_from_baked_channel() {
        let Fixture {
            mut material,
            interface,
            ..
        } = fixture();
        let before_surface = surface_sources(&material);
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);
        let rough = instruction("Roughness", SocketKind::Float, &[Channel::G]);
        let bake = rewirer
            .prepare(&mut material, "ORM", None, &[&rough])
            .unwrap();
        let sampler = bake.proxy.sampler;

        let warnings = rewirer.cleanup_pass(&mut material, bake).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(surface_sources(&material), before_surface);

        let feeds = material
            .tree
            .upstream(&InputRef::new(interface, "Roughness"));
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].socket, "Green");
        let separator = material.tree.node(feeds[0].node).unwrap();
        assert_eq!(separator.kind, NodeKind::SeparateColor);
        assert_eq!(
            material.tree.upstream(&InputRef::new(feeds[0].node, "Color")),
            vec![OutputRef::new(sampler, "Color")]
        );
        // No prep-only routing survives.
        assert!(material
            .tree
            .find_node(|node| node.kind == NodeKind::CombineColor)
            .is_none());
    }

    #[test]
    fn unlinked_inputs_get_constant_proxies() {
        let Fixture { mut material, .. } = fixture();
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);
        let metal = instruction("Metallic", SocketKind::Float, &[Channel::B]);
        let bake = rewirer
            .prepare(&mut material, "ORM", None, &[&metal])
            .unwrap();

        let composed = surface_sources(&material);
        let combine = composed[0].node;
        assert_eq!(
            material.tree.node(combine).unwrap().kind,
            NodeKind::CombineColor
        );
        let feeds = material.tree.upstream(&InputRef::new(combine, "Blue"));
        let proxy = material.tree.node(feeds[0].node).unwrap();
        assert_eq!(proxy.kind, NodeKind::Value);
        assert_eq!(proxy.output("Value").unwrap().default, SocketValue::Float(0.75));

        let nodes_before_cleanup = material.tree.node_count();
        rewirer.cleanup_pass(&mut material, bake).unwrap();
        assert!(material.tree.node_count() < nodes_before_cleanup);
        assert!(material
            .tree
            .find_node(|node| node.kind == NodeKind::Value && node.output("Value").unwrap().default == SocketValue::Float(0.75))
            .is_none());
    }

    #[test]
    fn full_colour_links_directly() {
        let Fixture { mut material, .. } = fixture();
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);
        let albedo = instruction("Base Color", SocketKind::Color, &[]);
        let _bake = rewirer
            .prepare(&mut material, "Albedo", None, &[&albedo])
            .unwrap();
        let sources = surface_sources(&material);
        assert_eq!(sources.len(), 1);
        let rgb = material.tree.node(sources[0].node).unwrap();
        assert_eq!(rgb.kind, NodeKind::Rgb);
        assert_eq!(
            rgb.output("Color").unwrap().default,
            SocketValue::Color([0.5, 0.25, 0.125, 1.0])
        );
    }

    #[test]
    fn diffuse_scaffold_captures_alpha() {
        let Fixture {
            mut material,
            upstream,
            ..
        } = fixture();
        let rewirer = GraphRewirer::new(BakeType::Diffuse, 1);
        let rough = instruction("Roughness", SocketKind::Float, &[Channel::A]);
        let _bake = rewirer
            .prepare(&mut material, "ORM", None, &[&rough])
            .unwrap();

        let mix = surface_sources(&material)[0].node;
        assert_eq!(material.tree.node(mix).unwrap().kind, NodeKind::MixShader);
        assert_eq!(
            material.tree.upstream(&InputRef::new(mix, "Fac")),
            vec![OutputRef::new(upstream, "Value")]
        );
        let shader_b = material.tree.upstream(&InputRef::new(mix, "Shader B"));
        assert_eq!(
            material.tree.node(shader_b[0].node).unwrap().kind,
            NodeKind::DiffuseBsdf
        );
    }

    #[test]
    fn emit_drops_alpha_with_warning() {
        let Fixture {
            mut material,
            interface,
            upstream,
        } = fixture();
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);
        let rough = instruction("Roughness", SocketKind::Float, &[Channel::A]);
        let bake = rewirer
            .prepare(&mut material, "ORM", None, &[&rough])
            .unwrap();
        assert_eq!(bake.warnings.len(), 1);

        let warnings = rewirer.cleanup_pass(&mut material, bake).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            material.tree.upstream(&InputRef::new(interface, "Roughness")),
            vec![OutputRef::new(upstream, "Value")]
        );
    }

    #[test]
    fn invalid_targets_leave_graph_untouched() {
        let Fixture { mut material, .. } = fixture();
        let nodes = material.tree.node_count();
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);

        let two = instruction("Roughness", SocketKind::Float, &[Channel::R, Channel::G]);
        let err = rewirer
            .prepare(&mut material, "ORM", None, &[&two])
            .unwrap_err();
        assert!(matches!(err, RewireError::ScalarChannels { .. }));

        let missing = instruction("Sheen", SocketKind::Float, &[Channel::R]);
        let err = rewirer
            .prepare(&mut material, "ORM", None, &[&missing])
            .unwrap_err();
        assert!(matches!(err, RewireError::MissingInput { input, .. } if input == "Sheen"));
        assert_eq!(material.tree.node_count(), nodes);
    }

    #[test]
    fn missing_interface_is_an_integrity_error() {
        let mut material = Material::new("Bare");
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);
        let rough = instruction("Roughness", SocketKind::Float, &[Channel::R]);
        let err = rewirer
            .prepare(&mut material, "ORM", None, &[&rough])
            .unwrap_err();
        assert!(matches!(err, RewireError::MissingOutput(_)));

        material.tree.add_node(Node::material_output());
        let err = rewirer
            .prepare(&mut material, "ORM", None, &[&rough])
            .unwrap_err();
        assert!(matches!(err, RewireError::MissingInterface(_)));
    }

    #[test]
    fn rollback_keeps_user_sampler() {
        let Fixture { mut material, .. } = fixture();
        let user_sampler = material.tree.add_node(Node::image_texture("ORM"));
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);
        let rough = instruction("Roughness", SocketKind::Float, &[Channel::R]);
        let bake = rewirer
            .prepare(&mut material, "ORM", None, &[&rough])
            .unwrap();
        assert_eq!(bake.proxy.sampler, user_sampler);
        assert!(!bake.proxy.was_created);

        rewirer.rollback(&mut material, bake);
        assert!(material.tree.contains(user_sampler));
    }

    #[test]
    fn dummy_sampler_is_removed_on_cleanup() {
        let Fixture { mut material, .. } = fixture();
        let nodes = material.tree.node_count();
        let before_surface = surface_sources(&material);
        let rewirer = GraphRewirer::new(BakeType::Emit, 0);
        let bake = rewirer.prepare_dummy(&mut material, "__DummyImage").unwrap();
        assert!(bake.is_dummy());
        assert_eq!(material.tree.active(), Some(bake.proxy.sampler));
        assert_eq!(surface_sources(&material), before_surface);

        rewirer.cleanup_pass(&mut material, bake).unwrap();
        assert_eq!(material.tree.node_count(), nodes);
        assert!(material.tree.active().is_none());
    }

    #[test]
    fn ensure_restored_repairs_drifted_surface() {
        let Fixture { mut material, .. } = fixture();
        let state = MaterialGraphState::capture(&material).unwrap();
        let stray = material.tree.add_node(Node::emission());
        let surface = material.surface_input().unwrap();
        material
            .tree
            .link(OutputRef::new(stray, "Emission"), InputRef::new(surface.node, SURFACE))
            .unwrap();

        assert!(state.ensure_restored(&mut material.tree).unwrap());
        assert_eq!(surface_sources(&material), state.original);
        assert!(!state.ensure_restored(&mut material.tree).unwrap());
    }
}
