//! Render-Target Pool
//!
//! Provides render targets for short-lived, per-frame scratch use (the raw
//! reflection and the two blur ping-pong targets). Every buffer handed out by
//! [`RenderTargetPool::acquire`] must come back through
//! [`RenderTargetPool::release`] before the frame ends.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               RenderTargetPool                      │
//! │                                                     │
//! │  active: {TextureId → PoolKey}   (outstanding)      │
//! │  free:   {PoolKey → [PooledTarget]}                 │
//! │                                                     │
//! │  acquire()   → TransientBuffer   (move-only)        │
//! │  release(TransientBuffer)                           │
//! │  end_frame() (reclaims anything left outstanding)   │
//! │  trim(n)     (after resolution changes)             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Memory Strategy
//!
//! - Targets are **not** destroyed on release; they return to the free list
//!   and are reused by the next `acquire` with the same key.
//! - The pool grows on demand.
//! - [`RenderTargetPool::trim`] drops targets that sat unused for several
//!   frames, which is what reclaims memory after a resize.

use rustc_hash::FxHashMap;

use crate::device::{RenderDevice, TargetUsage, TextureDesc, TextureFormat, TextureId};
use crate::errors::Result;

// ─── Public Types ─────────────────────────────────────────────────────────────

/// A render target borrowed from the pool for the current frame.
///
/// Deliberately neither `Clone` nor `Copy`: releasing consumes the handle, so
/// a buffer cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "transient buffers must be released back to the pool"]
pub struct TransientBuffer {
    id: TextureId,
    key: PoolKey,
}

impl TransientBuffer {
    #[inline]
    #[must_use]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.key.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.key.height
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.key.format
    }
}

// ─── Internal Types ───────────────────────────────────────────────────────────

/// Key for recycling. Usage is part of the key so a recycled target always
/// supports what the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TargetUsage,
}

impl PoolKey {
    fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
        }
    }
}

struct PooledTarget {
    id: TextureId,
    /// Number of `trim` calls this target has survived in the free list.
    idle_frames: u32,
}

// ─── Pool Implementation ──────────────────────────────────────────────────────

/// Pool of transient render targets with per-frame accounting.
#[derive(Default)]
pub struct RenderTargetPool {
    /// Targets handed out and not yet released.
    active: FxHashMap<TextureId, PoolKey>,
    /// Released targets available for reuse, grouped by key.
    free: FxHashMap<PoolKey, Vec<PooledTarget>>,

    acquired_total: u64,
    released_total: u64,
    frame_acquired: u32,
    frame_released: u32,
    leaked_total: u64,
}

impl RenderTargetPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Frame boundary ─────────────────────────────────────────────────────

    /// Resets the per-frame counters.
    pub fn begin_frame(&mut self) {
        self.frame_acquired = 0;
        self.frame_released = 0;
    }

    /// Returns every still-outstanding target to the free list.
    ///
    /// A correct frame releases everything itself, so this normally does
    /// nothing. Returns the number of targets reclaimed.
    pub fn end_frame(&mut self) -> usize {
        let leaked = self.active.len();
        if leaked > 0 {
            log::warn!(
                "RenderTargetPool: reclaiming {leaked} transient target(s) not released this frame"
            );
            for (id, key) in self.active.drain() {
                self.free
                    .entry(key)
                    .or_default()
                    .push(PooledTarget { id, idle_frames: 0 });
            }
            self.leaked_total += leaked as u64;
        }
        leaked
    }

    // ── Acquire / Release ──────────────────────────────────────────────────

    /// Acquires a bilinear-filtered, single-mip render target.
    ///
    /// Reuses a free target with the same size and format when one exists;
    /// otherwise creates a new one on `device`.
    pub fn acquire<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        label: &'static str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<TransientBuffer> {
        self.acquire_desc(device, &TextureDesc::render_target(label, width, height, format))
    }

    /// Acquires a target matching an explicit descriptor.
    pub fn acquire_desc<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &TextureDesc,
    ) -> Result<TransientBuffer> {
        let key = PoolKey::from_desc(desc);

        let recycled = self.free.get_mut(&key).and_then(|bucket| {
            // Skip entries the device no longer knows about.
            while let Some(t) = bucket.pop() {
                if device.contains(t.id) {
                    return Some(t.id);
                }
            }
            None
        });

        let id = match recycled {
            Some(id) => id,
            None => device.create_texture(desc)?,
        };

        self.active.insert(id, key);
        self.acquired_total += 1;
        self.frame_acquired += 1;
        Ok(TransientBuffer { id, key })
    }

    /// Returns a target to the free list.
    pub fn release(&mut self, buffer: TransientBuffer) {
        if self.active.remove(&buffer.id).is_none() {
            // Reclaimed by `end_frame` of an earlier frame.
            log::error!(
                "RenderTargetPool: released {:?} which is not outstanding",
                buffer.id
            );
            return;
        }
        self.free.entry(buffer.key).or_default().push(PooledTarget {
            id: buffer.id,
            idle_frames: 0,
        });
        self.released_total += 1;
        self.frame_released += 1;
    }

    // ── Memory management ──────────────────────────────────────────────────

    /// Destroys free targets that have been idle for more than
    /// `max_idle_frames` calls to `trim`.
    pub fn trim<D: RenderDevice + ?Sized>(&mut self, device: &mut D, max_idle_frames: u32) {
        let mut destroyed = 0usize;
        for bucket in self.free.values_mut() {
            for t in bucket.iter_mut() {
                t.idle_frames += 1;
            }
            bucket.retain(|t| {
                let keep = t.idle_frames <= max_idle_frames;
                if !keep {
                    device.destroy_texture(t.id);
                    destroyed += 1;
                }
                keep
            });
        }
        self.free.retain(|_, bucket| !bucket.is_empty());
        if destroyed > 0 {
            log::debug!("RenderTargetPool: trimmed {destroyed} idle target(s)");
        }
    }

    /// Destroys every target the pool knows about, including outstanding ones.
    pub fn clear<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for (id, _) in self.active.drain() {
            device.destroy_texture(id);
        }
        for (_, bucket) in self.free.drain() {
            for t in bucket {
                device.destroy_texture(t.id);
            }
        }
    }

    // ── Accounting ─────────────────────────────────────────────────────────

    /// Targets acquired and not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.active.len()
    }

    /// Targets acquired since the last [`begin_frame`](Self::begin_frame).
    #[must_use]
    pub fn frame_acquired(&self) -> u32 {
        self.frame_acquired
    }

    /// Targets released since the last [`begin_frame`](Self::begin_frame).
    #[must_use]
    pub fn frame_released(&self) -> u32 {
        self.frame_released
    }

    #[must_use]
    pub fn acquired_total(&self) -> u64 {
        self.acquired_total
    }

    #[must_use]
    pub fn released_total(&self) -> u64 {
        self.released_total
    }

    /// Targets reclaimed by [`end_frame`](Self::end_frame) over the pool's
    /// lifetime.
    #[must_use]
    pub fn leaked_total(&self) -> u64 {
        self.leaked_total
    }

    /// Total number of targets managed by the pool (outstanding and free).
    #[must_use]
    pub fn total_texture_count(&self) -> usize {
        self.active.len() + self.free.values().map(Vec::len).sum::<usize>()
    }
}
