//! Handle registry for callers outside Rust.
//!
//! A binding layer never holds a pointer to a [`DeviceHandle`]. It holds a
//! [`HandleId`] (slot index plus generation), and every operation resolves
//! the id first. Ids of closed devices stop resolving, even after their slot
//! is reused.
//!
//! Getters follow the flat status convention: they return
//! [`INVALID_VALUE`] for an id that does not resolve.

use std::path::Path;

use crate::config::CaptureConfig;
use crate::device::V4l2Backend;
use crate::error::{CaptureError, Result};
use crate::format::from_wire_format;
use crate::handle::{DeviceHandle, PreviewSize};
use crate::traits::VideoBackend;

/// Sentinel returned by getters for unknown handles (-1 as unsigned).
pub const INVALID_VALUE: u32 = u32::MAX;

/// Generation-checked reference to a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

impl HandleId {
    /// Pack into an opaque integer token.
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpack a token produced by [`HandleId::to_raw`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

struct Slot<B: VideoBackend> {
    generation: u32,
    device: Option<DeviceHandle<B>>,
}

/// Owns every open device and hands out [`HandleId`]s.
pub struct Registry<B: VideoBackend + Clone = V4l2Backend> {
    backend: B,
    config: CaptureConfig,
    slots: Vec<Slot<B>>,
    free: Vec<u32>,
}

impl Registry<V4l2Backend> {
    /// Registry for real V4L2 devices with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(V4l2Backend, CaptureConfig::default())
    }
}

impl Default for Registry<V4l2Backend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: VideoBackend + Clone> Registry<B> {
    /// Registry opening devices through `backend`.
    pub const fn with_backend(backend: B, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Open a device and register it.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<HandleId> {
        let device =
            DeviceHandle::open_with(self.backend.clone(), path.as_ref(), self.config.clone())?;

        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.device = Some(device);
                return Ok(HandleId {
                    index,
                    generation: slot.generation,
                });
            }
        }

        let index = u32::try_from(self.slots.len()).map_err(|_| CaptureError::InsufficientMemory)?;
        self.slots.push(Slot {
            generation: 0,
            device: Some(device),
        });
        Ok(HandleId {
            index,
            generation: 0,
        })
    }

    fn get(&self, id: HandleId) -> Option<&DeviceHandle<B>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.device.as_ref())
    }

    fn get_mut(&mut self, id: HandleId) -> Result<&mut DeviceHandle<B>> {
        let device = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.device.as_mut());
        device.ok_or_else(|| {
            log::error!("Unknown or closed device handle {id:?}");
            CaptureError::InvalidArguments
        })
    }

    /// Close and unregister a device. Unknown ids are ignored.
    pub fn close(&mut self, id: HandleId) {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(mut device) = slot.device.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        device.close();
    }

    /// See [`DeviceHandle::init`].
    pub fn init(&mut self, id: HandleId, width: u32, height: u32, format_id: i32) -> Result<()> {
        self.get_mut(id)?.init(width, height, format_id)
    }

    /// See [`DeviceHandle::start`].
    pub fn start(&mut self, id: HandleId) -> Result<()> {
        self.get_mut(id)?.start()
    }

    /// See [`DeviceHandle::stop`]. Unknown ids are ignored.
    pub fn stop(&mut self, id: HandleId) {
        if let Ok(device) = self.get_mut(id) {
            device.stop();
        }
    }

    /// See [`DeviceHandle::capture`].
    pub fn capture(&mut self, id: HandleId, dst: &mut [u8]) -> Result<usize> {
        self.get_mut(id)?.capture(dst)
    }

    /// Frame buffer size in bytes, or [`INVALID_VALUE`].
    pub fn frame_size(&self, id: HandleId) -> u32 {
        self.get(id)
            .and_then(DeviceHandle::frame_size)
            .unwrap_or(INVALID_VALUE)
    }

    /// Negotiated width, or [`INVALID_VALUE`].
    pub fn frame_width(&self, id: HandleId) -> u32 {
        self.get(id).map_or(INVALID_VALUE, DeviceHandle::frame_width)
    }

    /// Negotiated height, or [`INVALID_VALUE`].
    pub fn frame_height(&self, id: HandleId) -> u32 {
        self.get(id).map_or(INVALID_VALUE, DeviceHandle::frame_height)
    }

    /// Negotiated format id, or [`INVALID_VALUE`] for unknown handles and
    /// formats outside the table.
    pub fn pixel_format(&self, id: HandleId) -> u32 {
        self.get(id)
            .and_then(|device| u32::try_from(from_wire_format(device.format().pixel_format)).ok())
            .unwrap_or(INVALID_VALUE)
    }

    /// See [`DeviceHandle::enum_preview_size`].
    pub fn enum_preview_size(
        &self,
        id: HandleId,
        index: i32,
        format_id: i32,
    ) -> Result<PreviewSize> {
        self.get(id)
            .ok_or(CaptureError::InvalidArguments)?
            .enum_preview_size(index, format_id)
    }

    /// Number of open devices.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.device.is_some()).count()
    }

    /// Whether no device is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
