//! Render backend trait and the headless implementation.
//!
//! [`RenderBackend`] is the seam between the scene controller and whatever
//! draws the frame. GPU-side resources are represented by [`GpuHandle`]s,
//! which are move-only: the only way to give one back is
//! [`RenderBackend::release`], which consumes it.

use super::camera::{Camera, Lighting};
use super::procedural::{Primitive, ProceduralAvatar};
use crate::error::{Result, VisageError};
use crate::math::Color;
use crate::rig::Rig;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};

/// A GPU-side resource owned by the scene. Deliberately neither `Clone` nor
/// `Copy`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct GpuHandle {
    id: u64,
}

impl GpuHandle {
    /// Wrap a backend-assigned id. Only backends should mint handles.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Geometry,
    Material,
    Texture,
}

/// What to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDesc {
    pub kind: ResourceKind,
    pub label: String,
}

impl ResourceDesc {
    pub fn new(kind: ResourceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

/// The avatar as the backend sees it this frame.
#[derive(Debug, Clone, Copy)]
pub enum AvatarView<'a> {
    Procedural(&'a ProceduralAvatar),
    Loaded(&'a Rig),
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct SceneView<'a> {
    pub time: f64,
    pub camera: &'a Camera,
    pub lighting: &'a Lighting,
    pub background: Color,
    pub floor: &'a Primitive,
    pub avatar: Option<AvatarView<'a>>,
}

/// Drawing surface plus GPU resource management.
pub trait RenderBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Create the output surface.
    ///
    /// # Errors
    ///
    /// Returns [`VisageError::Render`] if no surface can be created.
    fn create_surface(&mut self, width: u32, height: u32) -> Result<()>;

    /// Upload one resource.
    ///
    /// # Errors
    ///
    /// Returns [`VisageError::Render`] if the upload fails.
    fn upload(&mut self, desc: &ResourceDesc) -> Result<GpuHandle>;

    /// Free a resource previously returned by [`upload`](Self::upload).
    fn release(&mut self, handle: GpuHandle);

    fn resize(&mut self, width: u32, height: u32);

    /// Draw one frame.
    ///
    /// # Errors
    ///
    /// Returns [`VisageError::Render`] if the frame could not be drawn.
    fn render(&mut self, view: &SceneView<'_>) -> Result<()>;

    /// Tear down the surface. Called once, after all handles are released.
    fn dispose(&mut self);
}

/// Counters shared between a [`HeadlessBackend`] and its observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessStats {
    pub live: BTreeSet<u64>,
    pub uploads: usize,
    pub releases: usize,
    /// Releases of ids that were not live.
    pub double_releases: usize,
    pub frames: u64,
    pub size: Option<(u32, u32)>,
    pub disposed: bool,
    pub last_avatar: Option<String>,
}

/// Backend that draws nothing but tracks every resource and frame.
///
/// Cloning the stats handle before moving the backend into a scene lets
/// callers observe it afterwards.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    stats: Arc<Mutex<HeadlessStats>>,
    next_id: u64,
    /// Uploads whose label equals this fail.
    reject_label: Option<String>,
    fail_render: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload of a resource labelled `label`.
    pub fn rejecting(mut self, label: impl Into<String>) -> Self {
        self.reject_label = Some(label.into());
        self
    }

    /// Fail every frame.
    pub fn failing_render(mut self) -> Self {
        self.fail_render = true;
        self
    }

    pub fn stats(&self) -> Arc<Mutex<HeadlessStats>> {
        Arc::clone(&self.stats)
    }

    fn with_stats<T>(&self, f: impl FnOnce(&mut HeadlessStats) -> T) -> Option<T> {
        match self.stats.lock() {
            Ok(mut stats) => Some(f(&mut stats)),
            Err(_) => {
                warn!("headless stats lock poisoned");
                None
            }
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.with_stats(|s| s.size = Some((width, height)));
        info!(width, height, "headless surface created");
        Ok(())
    }

    fn upload(&mut self, desc: &ResourceDesc) -> Result<GpuHandle> {
        if self.reject_label.as_deref() == Some(desc.label.as_str()) {
            return Err(VisageError::Render(format!(
                "out of GPU memory uploading {}",
                desc.label
            )));
        }
        self.next_id += 1;
        let id = self.next_id;
        self.with_stats(|s| {
            s.live.insert(id);
            s.uploads += 1;
        });
        trace!(id, kind = ?desc.kind, label = %desc.label, "uploaded");
        Ok(GpuHandle::new(id))
    }

    fn release(&mut self, handle: GpuHandle) {
        let id = handle.id();
        self.with_stats(|s| {
            s.releases += 1;
            if !s.live.remove(&id) {
                s.double_releases += 1;
                warn!(id, "release of unknown GPU handle");
            }
        });
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.with_stats(|s| s.size = Some((width, height)));
        debug!(width, height, "headless surface resized");
    }

    fn render(&mut self, view: &SceneView<'_>) -> Result<()> {
        if self.fail_render {
            return Err(VisageError::Render("device lost".into()));
        }
        let avatar = view.avatar.map(|a| match a {
            AvatarView::Procedural(avatar) => avatar.style.to_string(),
            AvatarView::Loaded(rig) => rig
                .node(rig.root())
                .map(|n| n.name.clone())
                .unwrap_or_default(),
        });
        self.with_stats(|s| {
            s.frames += 1;
            s.last_avatar = avatar;
        });
        Ok(())
    }

    fn dispose(&mut self) {
        let leaked = self
            .with_stats(|s| {
                s.disposed = true;
                s.live.len()
            })
            .unwrap_or(0);
        if leaked > 0 {
            warn!(leaked, "headless backend disposed with live handles");
        }
        info!("headless surface disposed");
    }
}
