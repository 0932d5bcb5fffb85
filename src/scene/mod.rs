//! The avatar scene: camera, lights, floor, one avatar instance and the
//! per-frame update dispatch.
//!
//! [`AvatarSceneController`] moves through `Uninitialized → Ready → Disposed`.
//! While ready it owns exactly one avatar instance. Swapping instances
//! releases the old instance's GPU handles before the new one is uploaded;
//! if the upload fails, the previous instance is uploaded again and stays on
//! screen.
//!
//! Each [`frame`](AvatarSceneController::frame):
//!
//! 1. advances orbit controls;
//! 2. applies held movement keys to the avatar position;
//! 3. runs the [`ExpressionAnimator`] if the instance has morph bindings,
//!    otherwise the transform-based animation;
//! 4. renders. Render errors are logged and the next frame proceeds.

pub mod backend;
pub mod camera;
pub mod frame_loop;
pub mod input;
pub mod procedural;

pub use backend::{
    AvatarView, GpuHandle, HeadlessBackend, HeadlessStats, RenderBackend, ResourceDesc,
    ResourceKind, SceneView,
};
pub use camera::{Camera, Light, LightKind, Lighting, OrbitControls};
pub use frame_loop::FrameLoop;
pub use input::{Key, KeyState};
pub use procedural::{LegacyAnimator, ProceduralAvatar, ProceduralStyle};

use crate::audio::analyzer::AmplitudeProbe;
use crate::config::{AnimationConfig, SceneConfig, VisageConfig};
use crate::error::{Result, VisageError};
use crate::expression::{AnimationState, ExpressionAnimator, FrameInput, Pose, apply_pose};
use crate::math::{Color, Transform, Vec3};
use crate::morph::{MorphTargetController, RigHandle};
use crate::rig::inspect::{ModelInfo, inspect, log_model_info};
use crate::rig::{NodeId, Rig};
use crate::signals::AvatarSignals;
use procedural::{Primitive, breathing_offset, head_sway};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Lifecycle of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Uninitialized,
    Ready,
    Disposed,
}

/// Proof of an asynchronous model load request. Only the most recent
/// ticket can complete.
#[derive(Debug, PartialEq, Eq)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A loaded model plus what the scene derived from it.
struct LoadedAvatar {
    rig: Rig,
    controller: MorphTargetController,
    info: ModelInfo,
    /// Node moved by the fallback animation when there are no bindings.
    head: Option<NodeId>,
    head_rest: Transform,
}

impl LoadedAvatar {
    fn new(rig: Rig) -> Self {
        let controller = MorphTargetController::discover(&rig);
        let info = inspect(&rig);
        let head = rig
            .find_mesh_named(&["head", "face"])
            .or_else(|| rig.node(rig.root()).and_then(|n| n.children.first().copied()));
        let head_rest = head
            .and_then(|id| rig.node(id))
            .map(|n| n.transform)
            .unwrap_or_default();
        Self {
            rig,
            controller,
            info,
            head,
            head_rest,
        }
    }

    /// Sway and breathing on the head node only.
    fn animate_fallback(&mut self, time: f64, controls_enabled: bool) {
        let Some(node) = self.head.and_then(|id| self.rig.node_mut(id)) else {
            return;
        };
        if !controls_enabled {
            node.transform.rotation.y = self.head_rest.rotation.y + head_sway(time);
        }
        node.transform.position.y = self.head_rest.position.y + breathing_offset(time);
    }
}

enum Avatar {
    Procedural(ProceduralAvatar),
    Loaded(Box<LoadedAvatar>),
}

impl Avatar {
    /// Zero every morph weight of a loaded model on teardown.
    fn clear_morphs(&mut self) {
        if let Avatar::Loaded(loaded) = self {
            let LoadedAvatar {
                rig, controller, ..
            } = loaded.as_mut();
            controller.reset_all(rig);
        }
    }

    fn label(&self) -> String {
        match self {
            Avatar::Procedural(avatar) => format!("procedural:{}", avatar.style),
            Avatar::Loaded(loaded) => {
                let name = loaded
                    .rig
                    .node(loaded.rig.root())
                    .map(|n| n.name.as_str())
                    .unwrap_or("");
                format!("model:{name}")
            }
        }
    }

    fn view(&self) -> AvatarView<'_> {
        match self {
            Avatar::Procedural(avatar) => AvatarView::Procedural(avatar),
            Avatar::Loaded(loaded) => AvatarView::Loaded(&loaded.rig),
        }
    }

    fn position_mut(&mut self) -> &mut Vec3 {
        match self {
            Avatar::Procedural(avatar) => &mut avatar.group.position,
            Avatar::Loaded(loaded) => &mut loaded.rig.root_transform_mut().position,
        }
    }

    fn position(&self) -> Vec3 {
        match self {
            Avatar::Procedural(avatar) => avatar.group.position,
            Avatar::Loaded(loaded) => loaded.rig.root_transform().position,
        }
    }

    /// GPU resources this avatar needs.
    fn resources(&self) -> Vec<ResourceDesc> {
        match self {
            Avatar::Procedural(avatar) => avatar.primitives().flat_map(primitive_resources).collect(),
            Avatar::Loaded(loaded) => {
                let rig = &loaded.rig;
                let mut out: Vec<ResourceDesc> = rig
                    .meshes()
                    .map(|(_, node)| ResourceDesc::new(ResourceKind::Geometry, node.name.clone()))
                    .collect();
                let mut textures = BTreeSet::new();
                for material in rig.materials() {
                    out.push(ResourceDesc::new(ResourceKind::Material, material.name.clone()));
                    textures.extend(material.textures.iter().copied());
                }
                out.extend(textures.into_iter().map(|texture| {
                    ResourceDesc::new(ResourceKind::Texture, format!("texture#{}", texture.0))
                }));
                out
            }
        }
    }
}

fn primitive_resources(primitive: &Primitive) -> [ResourceDesc; 2] {
    [
        ResourceDesc::new(ResourceKind::Geometry, primitive.name),
        ResourceDesc::new(ResourceKind::Material, primitive.name),
    ]
}

/// An avatar with its uploaded resources.
struct Instance {
    avatar: Avatar,
    handles: Vec<GpuHandle>,
}

/// Upload every resource in `descs`, or none of them.
fn upload_all(backend: &mut dyn RenderBackend, descs: &[ResourceDesc]) -> Result<Vec<GpuHandle>> {
    let mut handles = Vec::with_capacity(descs.len());
    for desc in descs {
        match backend.upload(desc) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                release_all(backend, handles);
                return Err(e);
            }
        }
    }
    Ok(handles)
}

fn release_all(backend: &mut dyn RenderBackend, handles: Vec<GpuHandle>) {
    for handle in handles {
        backend.release(handle);
    }
}

/// Owns the render surface, camera, lights and the active avatar.
pub struct AvatarSceneController {
    config: SceneConfig,
    state: SceneState,
    backend: Option<Box<dyn RenderBackend>>,
    camera: Camera,
    lighting: Lighting,
    controls: Option<OrbitControls>,
    keys: KeyState,
    floor: Primitive,
    floor_handles: Vec<GpuHandle>,
    instance: Option<Instance>,
    animator: ExpressionAnimator,
    legacy: LegacyAnimator,
    signals: AvatarSignals,
    probe: Option<AmplitudeProbe>,
    load_seq: u64,
    pending_load: Option<u64>,
    size: (u32, u32),
    last_time: f64,
    animation: AnimationState,
    render_failures: u64,
}

impl AvatarSceneController {
    pub fn new(config: &VisageConfig, signals: AvatarSignals) -> Self {
        Self::with_parts(
            config.scene.clone(),
            ExpressionAnimator::new(config.animation.clone()),
            LegacyAnimator::new(),
            signals,
        )
    }

    /// A scene whose random blinks are reproducible.
    pub fn with_seed(config: &VisageConfig, signals: AvatarSignals, seed: u64) -> Self {
        Self::with_parts(
            config.scene.clone(),
            ExpressionAnimator::with_seed(config.animation.clone(), seed),
            LegacyAnimator::with_seed(seed),
            signals,
        )
    }

    fn with_parts(
        config: SceneConfig,
        animator: ExpressionAnimator,
        legacy: LegacyAnimator,
        signals: AvatarSignals,
    ) -> Self {
        let height = camera::effective_height(config.height);
        Self {
            camera: Camera::new(config.fov_degrees, config.width, height),
            size: (config.width, height),
            config,
            state: SceneState::Uninitialized,
            backend: None,
            lighting: Lighting::default(),
            controls: None,
            keys: KeyState::default(),
            floor: procedural::floor(),
            floor_handles: Vec::new(),
            instance: None,
            animator,
            legacy,
            signals,
            probe: None,
            load_seq: 0,
            pending_load: None,
            last_time: 0.0,
            animation: AnimationState::default(),
            render_failures: 0,
        }
    }

    /// Create the surface, camera, lights and floor, then show the
    /// configured built-in avatar.
    ///
    /// # Errors
    ///
    /// Returns [`VisageError::Scene`] if the scene is not uninitialized, or
    /// [`VisageError::Render`] if the backend cannot create the surface or
    /// upload the initial resources.
    pub fn initialize(
        &mut self,
        mut backend: Box<dyn RenderBackend>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        match self.state {
            SceneState::Uninitialized => {}
            SceneState::Ready => return Err(VisageError::Scene("scene already initialized".into())),
            SceneState::Disposed => return Err(VisageError::Scene("scene has been disposed".into())),
        }

        let height = camera::effective_height(height);
        backend.create_surface(width, height)?;
        self.floor_handles = match upload_all(&mut *backend, &primitive_resources(&self.floor)) {
            Ok(handles) => handles,
            Err(e) => {
                backend.dispose();
                return Err(e);
            }
        };

        self.size = (width, height);
        self.camera = Camera::new(self.config.fov_degrees, width, height);
        self.controls = self
            .config
            .enable_controls
            .then(|| OrbitControls::new(&self.camera));
        info!(backend = backend.name(), width, height, "scene initialized");
        self.backend = Some(backend);
        self.state = SceneState::Ready;

        self.show_procedural(self.config.avatar)
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            SceneState::Ready => Ok(()),
            SceneState::Uninitialized => {
                Err(VisageError::Scene("scene is not initialized".into()))
            }
            SceneState::Disposed => Err(VisageError::Scene("scene has been disposed".into())),
        }
    }

    /// Replace the avatar with a built-in one.
    ///
    /// # Errors
    ///
    /// Fails if the scene is not ready or the upload fails; the previous
    /// avatar then stays on screen.
    pub fn show_procedural(&mut self, style: ProceduralStyle) -> Result<()> {
        self.ensure_ready()?;
        self.pending_load = None;
        self.swap(Avatar::Procedural(ProceduralAvatar::build(style)))
    }

    /// Replace the avatar with a loaded model.
    ///
    /// # Errors
    ///
    /// Fails if the scene is not ready or the upload fails; the previous
    /// avatar then stays on screen.
    pub fn show_loaded(&mut self, rig: Rig) -> Result<()> {
        self.ensure_ready()?;
        self.pending_load = None;
        let loaded = LoadedAvatar::new(rig);
        log_model_info(&loaded.info, "loaded avatar");
        if !loaded.controller.is_animation_ready() {
            info!("model has no blend shapes, using transform animation");
        }
        self.swap(Avatar::Loaded(Box::new(loaded)))
    }

    /// Announce an asynchronous model load. Any earlier ticket becomes
    /// stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_seq += 1;
        self.pending_load = Some(self.load_seq);
        debug!(ticket = self.load_seq, "model load started");
        LoadTicket(self.load_seq)
    }

    /// Finish an asynchronous load. Returns `Ok(false)` and drops `rig`
    /// without uploading anything if `ticket` is stale.
    ///
    /// # Errors
    ///
    /// Same as [`show_loaded`](Self::show_loaded).
    pub fn complete_load(&mut self, ticket: LoadTicket, rig: Rig) -> Result<bool> {
        if self.pending_load != Some(ticket.0) {
            debug!(ticket = ticket.0, "stale model load dropped");
            return Ok(false);
        }
        self.show_loaded(rig).map(|()| true)
    }

    fn swap(&mut self, avatar: Avatar) -> Result<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(VisageError::Scene("no render backend".into()));
        };
        let backend: &mut dyn RenderBackend = &mut **backend;

        let previous = self.instance.take().map(|old| {
            release_all(backend, old.handles);
            let mut avatar = old.avatar;
            avatar.clear_morphs();
            avatar
        });

        match upload_all(backend, &avatar.resources()) {
            Ok(handles) => {
                info!(avatar = %avatar.label(), resources = handles.len(), "avatar instance swapped");
                self.instance = Some(Instance { avatar, handles });
                self.animator.reset(self.last_time);
                self.legacy.reset();
                Ok(())
            }
            Err(e) => {
                warn!(avatar = %avatar.label(), error = %e, "avatar upload failed, keeping previous instance");
                if let Some(old) = previous {
                    match upload_all(backend, &old.resources()) {
                        Ok(handles) => {
                            self.instance = Some(Instance {
                                avatar: old,
                                handles,
                            });
                            self.animator.reset(self.last_time);
                        }
                        Err(restore) => {
                            error!(error = %restore, "previous avatar could not be restored");
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Advance and render one frame at `time` seconds. Does nothing unless
    /// the scene is ready.
    pub fn frame(&mut self, time: f64) -> AnimationState {
        if self.state != SceneState::Ready {
            return self.animation;
        }

        if let Some(controls) = self.controls.as_mut() {
            controls.update(&mut self.camera);
        }

        let (speaking, listening) = self.signals.snapshot();
        let controls_enabled = self.config.enable_controls;

        if let Some(instance) = self.instance.as_mut() {
            if controls_enabled && self.keys.any() {
                let step = self.keys.movement(self.config.move_speed);
                let position = instance.avatar.position_mut();
                *position = *position + step;
            }

            self.animation = match &mut instance.avatar {
                Avatar::Loaded(loaded) if loaded.controller.is_animation_ready() => {
                    let input = FrameInput {
                        time,
                        speaking,
                        listening,
                        amplitude: self.probe.as_ref().and_then(AmplitudeProbe::level),
                        bands: self.probe.as_ref().and_then(AmplitudeProbe::bands),
                    };
                    let LoadedAvatar {
                        rig, controller, ..
                    } = loaded.as_mut();
                    let mut handle = RigHandle::new(controller, rig);
                    self.animator.update(&mut handle, &input)
                }
                Avatar::Loaded(loaded) => {
                    loaded.animate_fallback(time, controls_enabled);
                    AnimationState {
                        speaking,
                        listening,
                        ..AnimationState::default()
                    }
                }
                Avatar::Procedural(avatar) => {
                    let step =
                        self.legacy
                            .animate(avatar, time, speaking, listening, controls_enabled);
                    AnimationState {
                        speaking_amplitude: step.mouth_open,
                        speaking,
                        listening,
                        ..AnimationState::default()
                    }
                }
            };
        }

        self.render(time);
        self.last_time = time;
        self.animation
    }

    fn render(&mut self, time: f64) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let view = SceneView {
            time,
            camera: &self.camera,
            lighting: &self.lighting,
            background: Color::from_hex(self.config.background),
            floor: &self.floor,
            avatar: self.instance.as_ref().map(|i| i.avatar.view()),
        };
        if let Err(e) = backend.render(&view) {
            self.render_failures += 1;
            if self.render_failures == 1 || self.render_failures % 600 == 0 {
                warn!(error = %e, failures = self.render_failures, "frame render failed");
            }
        }
    }

    /// Track a new surface size. Animation state is untouched.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.state != SceneState::Ready {
            return;
        }
        let height = camera::effective_height(height);
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(width, height);
        }
        self.camera.set_viewport(width, height);
        self.size = (width, height);
    }

    pub fn key_down(&mut self, key: Key) {
        self.keys.press(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.keys.release(key);
    }

    /// Orbit the camera by a pointer drag in pixels. Ignored without
    /// controls.
    pub fn pointer_drag(&mut self, dx: f32, dy: f32) {
        let height = self.size.1;
        if let Some(controls) = self.controls.as_mut() {
            controls.drag(dx, dy, height);
        }
    }

    pub fn zoom(&mut self, delta: f32) {
        if let Some(controls) = self.controls.as_mut() {
            controls.zoom(delta);
        }
    }

    /// Feed analyzer levels into lip-sync.
    pub fn attach_amplitude(&mut self, probe: AmplitudeProbe) {
        self.probe = Some(probe);
    }

    /// Fall back to the synthetic mouth curve.
    pub fn detach_amplitude(&mut self) {
        self.probe = None;
    }

    pub fn signals(&self) -> AvatarSignals {
        self.signals.clone()
    }

    /// Apply a discrete expression to a loaded model. Returns `false` when
    /// the current avatar has no morph bindings.
    pub fn apply_pose(&mut self, pose: Pose) -> bool {
        let Some(loaded) = self.loaded_mut() else {
            return false;
        };
        let LoadedAvatar {
            rig, controller, ..
        } = loaded;
        apply_pose(&mut RigHandle::new(controller, rig), pose);
        true
    }

    /// Point the eyes of a loaded model. Returns `false` without bindings.
    pub fn look_at(&mut self, x: f32, y: f32) -> bool {
        let Some(instance) = self.instance.as_mut() else {
            return false;
        };
        let Avatar::Loaded(loaded) = &mut instance.avatar else {
            return false;
        };
        if !loaded.controller.is_animation_ready() {
            return false;
        }
        let LoadedAvatar {
            rig, controller, ..
        } = loaded.as_mut();
        self.animator
            .look_at(&mut RigHandle::new(controller, rig), x, y);
        self.animation.gaze = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
        true
    }

    /// Blink now unless a blink is already running.
    pub fn trigger_blink(&mut self) -> bool {
        self.loaded_mut().is_some() && self.animator.trigger_blink(self.last_time)
    }

    fn loaded_mut(&mut self) -> Option<&mut LoadedAvatar> {
        match &mut self.instance.as_mut()?.avatar {
            Avatar::Loaded(loaded) if loaded.controller.is_animation_ready() => {
                Some(loaded.as_mut())
            }
            _ => None,
        }
    }

    /// The state computed by the latest frame.
    pub fn animation_state(&self) -> AnimationState {
        self.animation
    }

    /// Channels the current model exposes; empty for built-in avatars.
    pub fn available_channels(&self) -> BTreeSet<String> {
        match self.instance.as_ref().map(|i| &i.avatar) {
            Some(Avatar::Loaded(loaded)) => loaded.controller.available_channels(),
            _ => BTreeSet::new(),
        }
    }

    pub fn model_info(&self) -> Option<&ModelInfo> {
        match self.instance.as_ref().map(|i| &i.avatar) {
            Some(Avatar::Loaded(loaded)) => Some(&loaded.info),
            _ => None,
        }
    }

    pub fn rig(&self) -> Option<&Rig> {
        match self.instance.as_ref().map(|i| &i.avatar) {
            Some(Avatar::Loaded(loaded)) => Some(&loaded.rig),
            _ => None,
        }
    }

    pub fn procedural_avatar(&self) -> Option<&ProceduralAvatar> {
        match self.instance.as_ref().map(|i| &i.avatar) {
            Some(Avatar::Procedural(avatar)) => Some(avatar),
            _ => None,
        }
    }

    pub fn avatar_position(&self) -> Option<Vec3> {
        self.instance.as_ref().map(|i| i.avatar.position())
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// GPU handles currently held, floor included.
    pub fn live_resource_count(&self) -> usize {
        self.floor_handles.len() + self.instance.as_ref().map_or(0, |i| i.handles.len())
    }

    pub fn animation_config(&self) -> &AnimationConfig {
        self.animator.config()
    }

    /// Release every GPU handle and the surface. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.state == SceneState::Disposed {
            return;
        }
        self.state = SceneState::Disposed;
        self.pending_load = None;
        self.controls = None;
        self.keys.clear();
        self.probe = None;

        if let Some(mut backend) = self.backend.take() {
            if let Some(instance) = self.instance.take() {
                release_all(&mut *backend, instance.handles);
            }
            release_all(&mut *backend, std::mem::take(&mut self.floor_handles));
            backend.dispose();
        }
        self.instance = None;
        info!("scene disposed");
    }
}

impl Drop for AvatarSceneController {
    fn drop(&mut self) {
        self.dispose();
    }
}
