//! Arena-indexed scene graph for loaded avatar models.
//!
//! A [`Rig`] is what the model-loading collaborator hands to the engine: a
//! fully populated, static node hierarchy. Every node is tagged once, at
//! build time, with the capabilities it carries ([`Part`]), so animation code
//! never probes node types per frame.
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]. Parents
//! always precede their children, so arena order is a valid pre-order walk.

pub mod inspect;

use crate::math::Transform;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RIG_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one built rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RigId(u64);

impl RigId {
    fn next() -> Self {
        Self(NEXT_RIG_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index of a node inside its rig's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a material inside its rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub(crate) usize);

/// Identifier of a texture image shared between materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Surface description of one material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub textures: Vec<TextureId>,
}

/// Vertex data summary of a mesh. Buffers themselves stay with the loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub materials: Vec<MaterialId>,
}

impl Geometry {
    pub fn new(vertex_count: usize, triangle_count: usize) -> Self {
        Self {
            vertex_count,
            triangle_count,
            materials: Vec::new(),
        }
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.materials.push(material);
        self
    }
}

/// Named blend shapes of one mesh and their current weights.
///
/// `names[i]` is the key of slot `i`; `weights` has the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphSet {
    names: Vec<String>,
    weights: Vec<f32>,
}

impl MorphSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let weights = vec![0.0; names.len()];
        Self { names, weights }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Capability tag of a node, resolved once when the rig is built.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Transform-only node.
    Group,
    /// Mesh with neither skin nor blend shapes.
    StaticMesh { geometry: Geometry },
    /// Mesh bound to a skeleton, optionally also carrying blend shapes.
    SkinnedMesh {
        geometry: Geometry,
        skeleton: Vec<NodeId>,
        morphs: Option<MorphSet>,
    },
    /// Unskinned mesh with blend shapes.
    BlendShapeMesh { geometry: Geometry, morphs: MorphSet },
    /// Skeleton joint.
    Bone,
}

impl Part {
    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            Part::StaticMesh { geometry }
            | Part::SkinnedMesh { geometry, .. }
            | Part::BlendShapeMesh { geometry, .. } => Some(geometry),
            Part::Group | Part::Bone => None,
        }
    }

    pub fn morphs(&self) -> Option<&MorphSet> {
        match self {
            Part::SkinnedMesh { morphs, .. } => morphs.as_ref(),
            Part::BlendShapeMesh { morphs, .. } => Some(morphs),
            _ => None,
        }
    }

    pub fn morphs_mut(&mut self) -> Option<&mut MorphSet> {
        match self {
            Part::SkinnedMesh { morphs, .. } => morphs.as_mut(),
            Part::BlendShapeMesh { morphs, .. } => Some(morphs),
            _ => None,
        }
    }

    pub fn is_mesh(&self) -> bool {
        self.geometry().is_some()
    }
}

/// One entry of the rig arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transform: Transform,
    pub part: Part,
}

/// A loaded avatar model.
#[derive(Debug, Clone)]
pub struct Rig {
    id: RigId,
    nodes: Vec<Node>,
    materials: Vec<Material>,
    animations: Vec<String>,
}

impl Rig {
    pub fn id(&self) -> RigId {
        self.id
    }

    /// The root group every other node descends from.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// All nodes in pre-order (parents before children).
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes carrying geometry, in pre-order.
    pub fn meshes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes().filter(|(_, n)| n.part.is_mesh())
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    /// Names of the animation clips shipped with the model.
    pub fn animations(&self) -> &[String] {
        &self.animations
    }

    /// Number of ancestors between `id` and the root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.node(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.node(parent).and_then(|n| n.parent);
        }
        depth
    }

    pub fn root_transform(&self) -> Transform {
        self.nodes[0].transform
    }

    pub fn root_transform_mut(&mut self) -> &mut Transform {
        &mut self.nodes[0].transform
    }

    /// First mesh whose lowercase name contains any of `needles`.
    pub fn find_mesh_named(&self, needles: &[&str]) -> Option<NodeId> {
        self.meshes().find_map(|(id, node)| {
            let lower = node.name.to_lowercase();
            needles
                .iter()
                .any(|needle| lower.contains(needle))
                .then_some(id)
        })
    }
}

/// Incremental constructor for [`Rig`]s, used by model loaders and tests.
#[derive(Debug)]
pub struct RigBuilder {
    nodes: Vec<Node>,
    materials: Vec<Material>,
    animations: Vec<String>,
}

impl RigBuilder {
    /// Start a rig whose root group is called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node {
                name: name.into(),
                parent: None,
                children: Vec::new(),
                transform: Transform::default(),
                part: Part::Group,
            }],
            materials: Vec::new(),
            animations: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a node under `parent`. An unknown parent attaches to the root.
    pub fn add(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: Transform,
        part: Part,
    ) -> NodeId {
        let parent = if parent.0 < self.nodes.len() {
            parent
        } else {
            NodeId(0)
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            transform,
            part,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn material(&mut self, name: impl Into<String>, textures: Vec<TextureId>) -> MaterialId {
        let id = MaterialId(self.materials.len());
        self.materials.push(Material {
            name: name.into(),
            textures,
        });
        id
    }

    pub fn animation(&mut self, name: impl Into<String>) -> &mut Self {
        self.animations.push(name.into());
        self
    }

    pub fn build(self) -> Rig {
        Rig {
            id: RigId::next(),
            nodes: self.nodes,
            materials: self.materials,
            animations: self.animations,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn sample_rig() -> Rig {
        let mut b = RigBuilder::new("avatar");
        let hips = b.add(b.root(), "Hips", Transform::default(), Part::Bone);
        let head_bone = b.add(hips, "Head", Transform::default(), Part::Bone);
        b.add(
            b.root(),
            "Wolf3D_Head",
            Transform::default(),
            Part::SkinnedMesh {
                geometry: Geometry::new(100, 50),
                skeleton: vec![hips, head_bone],
                morphs: Some(MorphSet::new(["mouthOpen", "jawOpen"])),
            },
        );
        b.build()
    }

    #[test]
    fn builder_links_parents_and_children() {
        let rig = sample_rig();
        let root = rig.node(rig.root()).unwrap();
        assert_eq!(root.children.len(), 2);
        let (head_id, _) = rig.nodes().find(|(_, n)| n.name == "Head").unwrap();
        assert_eq!(rig.depth(head_id), 2);
        assert_eq!(rig.depth(rig.root()), 0);
    }

    #[test]
    fn rigs_get_distinct_ids() {
        assert_ne!(sample_rig().id(), sample_rig().id());
    }

    #[test]
    fn unknown_parent_attaches_to_root() {
        let mut b = RigBuilder::new("r");
        let id = b.add(NodeId(42), "orphan", Transform::default(), Part::Group);
        let rig = b.build();
        assert_eq!(rig.node(id).unwrap().parent, Some(rig.root()));
    }

    #[test]
    fn find_mesh_named_is_case_insensitive() {
        let rig = sample_rig();
        assert!(rig.find_mesh_named(&["head", "face"]).is_some());
        assert!(rig.find_mesh_named(&["tail"]).is_none());
    }

    #[test]
    fn morph_set_starts_at_zero() {
        let set = MorphSet::new(["a", "b", "c"]);
        assert_eq!(set.len(), 3);
        assert!(set.weights().iter().all(|w| *w == 0.0));
    }
}
