//! One-pass capability report for a loaded rig.
//!
//! Used by the UI for read-only diagnostics and by the scene to log what a
//! freshly loaded model can do.

use super::{Part, Rig, TextureId};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::info;

/// Minimum bone count below which a skeleton is flagged as simplified.
const SIMPLIFIED_SKELETON_BONES: usize = 10;

/// Summary of everything a rig contains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInfo {
    pub mesh_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub material_count: usize,
    pub texture_count: usize,
    pub has_skeleton: bool,
    pub bone_names: Vec<String>,
    pub has_morph_targets: bool,
    pub morph_target_names: Vec<String>,
    pub animation_names: Vec<String>,
}

impl ModelInfo {
    pub fn bone_count(&self) -> usize {
        self.bone_names.len()
    }

    pub fn morph_target_count(&self) -> usize {
        self.morph_target_names.len()
    }

    pub fn has_animations(&self) -> bool {
        !self.animation_names.is_empty()
    }
}

/// Whether a model can be animated, with human-readable reasons.
#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    pub ready: bool,
    pub reasons: Vec<String>,
}

/// Walk the rig once and collect a [`ModelInfo`].
pub fn inspect(rig: &Rig) -> ModelInfo {
    let mut info = ModelInfo::default();
    let mut bones = BTreeSet::new();
    let mut morphs = BTreeSet::new();
    let mut materials = BTreeSet::new();

    for (_, node) in rig.nodes() {
        if let Some(geometry) = node.part.geometry() {
            info.mesh_count += 1;
            info.vertex_count += geometry.vertex_count;
            info.triangle_count += geometry.triangle_count;
            materials.extend(geometry.materials.iter().map(|m| m.0));
        }

        match &node.part {
            Part::Bone => {
                bones.insert(node.name.clone());
            }
            Part::SkinnedMesh { skeleton, .. } => {
                for bone in skeleton {
                    if let Some(b) = rig.node(*bone) {
                        bones.insert(b.name.clone());
                    }
                }
            }
            _ => {}
        }

        if let Some(set) = node.part.morphs() {
            morphs.extend(set.names().iter().cloned());
        }
    }

    let textures: BTreeSet<TextureId> = materials
        .iter()
        .filter_map(|idx| rig.materials().get(*idx))
        .flat_map(|m| m.textures.iter().copied())
        .collect();

    info.material_count = materials.len();
    info.texture_count = textures.len();
    info.has_skeleton = !bones.is_empty();
    info.bone_names = bones.into_iter().collect();
    info.has_morph_targets = !morphs.is_empty();
    info.morph_target_names = morphs.into_iter().collect();
    info.animation_names = rig.animations().to_vec();
    info
}

/// Decide whether a rig supports skeletal or facial animation.
pub fn animation_readiness(info: &ModelInfo) -> Readiness {
    let mut reasons = Vec::new();

    if !info.has_skeleton {
        reasons.push("no skeleton: skeletal animation unavailable".to_owned());
    }
    if !info.has_morph_targets {
        reasons.push("no morph targets: facial expressions unavailable".to_owned());
    }
    if info.has_skeleton && info.bone_count() < SIMPLIFIED_SKELETON_BONES {
        reasons.push(format!(
            "only {} bones: probably a simplified model",
            info.bone_count()
        ));
    }
    if reasons.is_empty() {
        reasons.push("model is ready for animation".to_owned());
    }

    Readiness {
        ready: info.has_skeleton || info.has_morph_targets,
        reasons,
    }
}

/// Render the bone hierarchy as an indented tree.
pub fn bone_hierarchy(rig: &Rig) -> String {
    let mut out = String::new();
    for (id, node) in rig.nodes() {
        if matches!(node.part, Part::Bone) {
            let indent = "  ".repeat(rig.depth(id));
            let _ = writeln!(out, "{indent}├─ {}", node.name);
        }
    }
    out
}

/// Log a model summary at info level.
pub fn log_model_info(info: &ModelInfo, label: &str) {
    info!(
        model = label,
        meshes = info.mesh_count,
        vertices = info.vertex_count,
        triangles = info.triangle_count,
        materials = info.material_count,
        textures = info.texture_count,
        bones = info.bone_count(),
        morph_targets = info.morph_target_count(),
        animations = info.animation_names.len(),
        "model inspected"
    );
}
