//! Blend shape (morph target) control for loaded rigs.
//!
//! [`MorphTargetController::discover`] walks a rig once and records, for every
//! blend shape key, which mesh slots carry it. All later reads and writes go
//! through that table instead of re-walking the hierarchy. A key bound by
//! several meshes (head and teeth, say) is written to all of them.

pub mod channel;

pub use channel::{Channel, UnknownChannel};

use crate::rig::{NodeId, Rig, RigId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Location of one blend shape weight inside a rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub node: NodeId,
    pub slot: usize,
}

/// Channel-to-slot table for one rig.
///
/// The table is fixed at discovery time. Applying it to any rig other than
/// the one it was discovered on does nothing.
#[derive(Debug, Clone)]
pub struct MorphTargetController {
    rig: RigId,
    bindings: BTreeMap<String, Vec<Binding>>,
}

/// Clamp a weight into [0, 1]. NaN becomes 0.
pub fn clamp_weight(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl MorphTargetController {
    /// Scan every mesh in `rig` and build the binding table.
    pub fn discover(rig: &Rig) -> Self {
        let mut bindings: BTreeMap<String, Vec<Binding>> = BTreeMap::new();
        for (node, n) in rig.nodes() {
            let Some(set) = n.part.morphs() else {
                continue;
            };
            for (slot, name) in set.names().iter().enumerate() {
                bindings
                    .entry(name.clone())
                    .or_default()
                    .push(Binding { node, slot });
            }
        }

        let outside_vocabulary = bindings
            .keys()
            .filter(|k| k.parse::<Channel>().is_err())
            .count();
        debug!(
            channels = bindings.len(),
            outside_vocabulary,
            "morph target discovery complete"
        );

        Self {
            rig: rig.id(),
            bindings,
        }
    }

    /// The rig this table was discovered on.
    pub fn rig_id(&self) -> RigId {
        self.rig
    }

    /// Write `value` (clamped) into every slot bound to `channel`.
    pub fn set_channel(&self, rig: &mut Rig, channel: Channel, value: f32) {
        self.set_named(rig, channel.key(), value);
    }

    /// Like [`set_channel`](Self::set_channel) for keys outside the vocabulary.
    pub fn set_named(&self, rig: &mut Rig, key: &str, value: f32) {
        if rig.id() != self.rig {
            trace!(key, "morph write against a foreign rig ignored");
            return;
        }
        let Some(bindings) = self.bindings.get(key) else {
            return;
        };
        let value = clamp_weight(value);
        for binding in bindings {
            if let Some(slot) = rig
                .node_mut(binding.node)
                .and_then(|n| n.part.morphs_mut())
                .and_then(|set| set.weights_mut().get_mut(binding.slot))
            {
                *slot = value;
            }
        }
    }

    /// Current weight of `channel` on the first bound mesh, 0 if unbound.
    ///
    /// Introspection only. Animation code tracks its own intended values.
    pub fn get_channel(&self, rig: &Rig, channel: Channel) -> f32 {
        self.get_named(rig, channel.key())
    }

    pub fn get_named(&self, rig: &Rig, key: &str) -> f32 {
        if rig.id() != self.rig {
            return 0.0;
        }
        self.bindings
            .get(key)
            .and_then(|b| b.first())
            .and_then(|b| {
                rig.node(b.node)
                    .and_then(|n| n.part.morphs())
                    .and_then(|set| set.weights().get(b.slot).copied())
            })
            .unwrap_or(0.0)
    }

    /// Whether any mesh binds `channel`.
    pub fn binds(&self, channel: Channel) -> bool {
        self.bindings.contains_key(channel.key())
    }

    /// Every discovered key, de-duplicated and sorted.
    pub fn available_channels(&self) -> BTreeSet<String> {
        self.bindings.keys().cloned().collect()
    }

    /// Slots bound to `key`, in discovery order.
    pub fn bindings(&self, key: &str) -> &[Binding] {
        self.bindings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when the rig exposes at least one blend shape.
    pub fn is_animation_ready(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Zero every discovered weight on every mesh. The scene runs this when
    /// a loaded instance is torn down.
    pub fn reset_all(&self, rig: &mut Rig) {
        if rig.id() != self.rig {
            return;
        }
        for bindings in self.bindings.values() {
            for binding in bindings {
                if let Some(slot) = rig
                    .node_mut(binding.node)
                    .and_then(|n| n.part.morphs_mut())
                    .and_then(|set| set.weights_mut().get_mut(binding.slot))
                {
                    *slot = 0.0;
                }
            }
        }
    }
}

/// A controller paired with the rig it drives, borrowed for one frame.
pub struct RigHandle<'a> {
    controller: &'a MorphTargetController,
    rig: &'a mut Rig,
}

impl<'a> RigHandle<'a> {
    pub fn new(controller: &'a MorphTargetController, rig: &'a mut Rig) -> Self {
        Self { controller, rig }
    }

    pub fn set(&mut self, channel: Channel, value: f32) {
        self.controller.set_channel(&mut *self.rig, channel, value);
    }

    pub fn get(&self, channel: Channel) -> f32 {
        self.controller.get_channel(&*self.rig, channel)
    }

    pub fn controller(&self) -> &MorphTargetController {
        self.controller
    }
}
