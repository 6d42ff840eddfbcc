//! Image texture nodes that read or receive a baked image inside a material.
use bakeconfig::Channel;
use shadergraph::{EditJournal, GraphError, InputRef, Node, NodeGraph, NodeId, NodeKind, OutputRef};
use tracing::debug;

const SAMPLER_OFFSET: f32 = 300.0;
const UV_OFFSET: f32 = 150.0;

/// The sampler node for one image in one material, plus the UV selector and
/// channel separator hanging off it. Nodes are created through the journal
/// handed in, so whoever owns that journal decides whether they survive.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProxy {
    pub image: String,
    pub sampler: NodeId,
    /// `false` when an image texture node for `image` already existed.
    pub was_created: bool,
    pub uv_node: Option<NodeId>,
    pub separator: Option<NodeId>,
}

impl ImageProxy {
    /// Reuses an image texture node already referencing `image`, or creates
    /// one left of `anchor`. With `uv_map` set, the sampler coordinates come
    /// from a UV map node selecting that layer unless they are already wired.
    pub fn acquire(
        graph: &mut NodeGraph,
        journal: &mut EditJournal,
        image: &str,
        uv_map: Option<&str>,
        anchor: [f32; 2],
    ) -> Result<Self, GraphError> {
        let existing = graph.find_node(|node| {
            node.kind == NodeKind::ImageTexture && node.image.as_deref() == Some(image)
        });
        let (sampler, was_created) = match existing {
            Some(id) => (id, false),
            None => {
                let node = Node::image_texture(image).at([anchor[0] - SAMPLER_OFFSET, anchor[1]]);
                (journal.add_node(graph, node), true)
            }
        };
        debug!(image, %sampler, was_created, "acquired image sampler");

        let mut proxy = Self {
            image: image.to_string(),
            sampler,
            was_created,
            uv_node: None,
            separator: None,
        };
        if let Some(uv_map) = uv_map {
            proxy.select_uv_map(graph, journal, uv_map)?;
        }
        Ok(proxy)
    }

    fn select_uv_map(
        &mut self,
        graph: &mut NodeGraph,
        journal: &mut EditJournal,
        uv_map: &str,
    ) -> Result<(), GraphError> {
        let vector = InputRef::new(self.sampler, "Vector");
        if let Some(upstream) = graph.upstream(&vector).first() {
            let node = graph.node(upstream.node);
            if let Some(node) = node.filter(|node| node.kind == NodeKind::UvMap) {
                if node.uv_map.as_deref() != Some(uv_map) {
                    debug!(
                        sampler = %self.sampler,
                        wired = ?node.uv_map,
                        requested = uv_map,
                        "sampler already reads another UV map; leaving it"
                    );
                }
                self.uv_node = Some(upstream.node);
            }
            return Ok(());
        }

        let location = graph
            .node(self.sampler)
            .map(|node| node.location)
            .unwrap_or_default();
        let uv_node = journal.add_node(
            graph,
            Node::uv_map(uv_map).at([location[0] - UV_OFFSET, location[1]]),
        );
        journal.link(graph, OutputRef::new(uv_node, "UV"), vector)?;
        self.uv_node = Some(uv_node);
        Ok(())
    }

    /// Output that reads `channel` of the image; `None` reads full colour.
    /// Red, green and blue go through a separator node created on demand.
    pub fn channel_output(
        &mut self,
        graph: &mut NodeGraph,
        journal: &mut EditJournal,
        channel: Option<Channel>,
    ) -> Result<OutputRef, GraphError> {
        let Some(channel) = channel else {
            return Ok(OutputRef::new(self.sampler, "Color"));
        };
        let Some(component) = channel.component() else {
            return Ok(OutputRef::new(self.sampler, "Alpha"));
        };

        let separator = match self.separator.filter(|id| graph.contains(*id)) {
            Some(id) => id,
            None => match self.find_separator(graph) {
                Some(id) => {
                    self.separator = Some(id);
                    id
                }
                None => self.create_separator(graph, journal)?,
            },
        };
        Ok(OutputRef::new(separator, component))
    }

    fn find_separator(&self, graph: &NodeGraph) -> Option<NodeId> {
        let color = OutputRef::new(self.sampler, "Color");
        graph
            .links()
            .filter(|(_, link)| link.from == color)
            .map(|(_, link)| link.to.node)
            .find(|id| {
                graph
                    .node(*id)
                    .is_some_and(|node| node.kind == NodeKind::SeparateColor)
            })
    }

    fn create_separator(
        &mut self,
        graph: &mut NodeGraph,
        journal: &mut EditJournal,
    ) -> Result<NodeId, GraphError> {
        let location = graph
            .node(self.sampler)
            .map(|node| node.location)
            .unwrap_or_default();
        let id = journal.add_node(
            graph,
            Node::separate_color().at([location[0] + UV_OFFSET, location[1] - UV_OFFSET]),
        );
        journal.link(
            graph,
            OutputRef::new(self.sampler, "Color"),
            InputRef::new(id, "Color"),
        )?;
        self.separator = Some(id);
        Ok(id)
    }

    /// Makes the sampler the node the render engine writes into.
    pub fn activate(&self, graph: &mut NodeGraph, journal: &mut EditJournal) -> Result<(), GraphError> {
        journal.set_select(graph, self.sampler, true)?;
        journal.set_active(graph, Some(self.sampler))
    }
}
