//! Accumulation State
//!
//! Persistent, cross-frame state of the temporal accumulation:
//!
//! - two ping-pong accumulation buffers addressed by role (*current* /
//!   *previous*) through an index that flips every frame, and
//! - the view-projection matrix recorded at the end of the previous frame,
//!   paired with an explicit "has previous frame" flag.
//!
//! Nothing else in the crate writes to these buffers directly; the temporal
//! accumulation pass renders into [`AccumulationState::current`], and the
//! driver calls [`AccumulationState::swap`] once the frame has composited.

use glam::Mat4;

use crate::device::{RenderDevice, TextureDesc, TextureFormat, TextureId};
use crate::errors::Result;

const SLOT_LABELS: [&str; 2] = ["SSLR Accumulation A", "SSLR Accumulation B"];

/// Two persistent accumulation buffers plus the previous view-projection.
#[derive(Debug, Default)]
pub struct AccumulationState {
    buffers: [Option<TextureId>; 2],
    size: (u32, u32),
    /// Physical index of the buffer currently playing the *current* role.
    current: usize,
    previous_view_projection: Option<Mat4>,
    generation: u64,
}

impl AccumulationState {
    /// Creates an empty state. No buffers exist until [`ensure`](Self::ensure).
    #[must_use]
    pub fn init() -> Self {
        Self::default()
    }

    /// Guarantees both buffers exist at exactly `width × height`, support
    /// random-access writes, and were zero-cleared when (re)created.
    ///
    /// If either buffer is missing or mis-sized, both are destroyed and
    /// recreated, discarding any reflection history. Returns `true` when the
    /// buffers were (re)created by this call.
    pub fn ensure<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
    ) -> Result<bool> {
        let valid = self.buffers.iter().all(|slot| {
            slot.is_some_and(|id| device.texture_size(id) == Some((width, height)))
        });
        if valid {
            return Ok(false);
        }

        self.destroy_buffers(device);

        let mut created = [None; 2];
        for (slot, &label) in SLOT_LABELS.iter().enumerate() {
            let desc =
                TextureDesc::render_target(label, width, height, TextureFormat::REFLECTION)
                    .with_storage();
            let result = device
                .create_texture(&desc)
                .and_then(|id| device.clear_texture(id, [0.0; 4]).map(|()| id));
            match result {
                Ok(id) => created[slot] = Some(id),
                Err(err) => {
                    for id in created.iter().flatten() {
                        device.destroy_texture(*id);
                    }
                    return Err(err);
                }
            }
        }

        self.buffers = created;
        self.size = (width, height);
        self.current = 0;
        self.generation += 1;
        log::debug!(
            "AccumulationState: (re)created buffers at {width}x{height} (generation {})",
            self.generation
        );
        Ok(true)
    }

    /// Exchanges the *current* and *previous* roles. No pixel data moves.
    #[inline]
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    /// Buffer the accumulation pass writes into this frame.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<TextureId> {
        self.buffers[self.current]
    }

    /// Buffer holding last frame's accumulated result.
    #[inline]
    #[must_use]
    pub fn previous(&self) -> Option<TextureId> {
        self.buffers[self.current ^ 1]
    }

    /// View-projection recorded at the end of the previous frame, if any.
    #[inline]
    #[must_use]
    pub fn previous_view_projection(&self) -> Option<Mat4> {
        self.previous_view_projection
    }

    pub fn set_previous_view_projection(&mut self, view_projection: Mat4) {
        self.previous_view_projection = Some(view_projection);
    }

    /// `true` once a frame has recorded its view-projection.
    #[inline]
    #[must_use]
    pub fn has_history(&self) -> bool {
        self.previous_view_projection.is_some()
    }

    /// Previous view-projection to use this frame. On the first frame there
    /// is none, so the current matrix stands in and reprojection is a no-op.
    #[inline]
    #[must_use]
    pub fn resolve_previous_view_projection(&self, current: Mat4) -> Mat4 {
        self.previous_view_projection.unwrap_or(current)
    }

    /// Size the buffers were created at, `(0, 0)` before the first `ensure`.
    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Incremented every time the buffers are (re)created.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Destroys both buffers and forgets the previous view-projection.
    pub fn teardown<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        self.destroy_buffers(device);
        self.previous_view_projection = None;
    }

    fn destroy_buffers<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for slot in &mut self.buffers {
            if let Some(id) = slot.take() {
                device.destroy_texture(id);
            }
        }
        self.size = (0, 0);
        self.current = 0;
    }
}
