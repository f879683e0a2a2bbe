//! Pool of kernel-owned, memory-mapped frame buffers.
//!
//! A [`BufferPool`] only exists fully mapped: [`BufferPool::allocate`] either
//! returns every granted buffer mapped, or drops the partial pool (unmapping
//! what was mapped, in order), hands the buffers back to the driver and
//! reports why.
//!
//! Drivers refuse format changes while they hold buffers, so a pool is
//! given back with [`BufferPool::release`] rather than a plain drop.

use std::os::unix::io::RawFd;

use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::traits::VideoBackend;

/// Mapped buffers in index order; dropping the pool unmaps them in order.
#[derive(Debug)]
pub struct BufferPool<M> {
    buffers: Vec<M>,
}

impl<M: AsRef<[u8]>> BufferPool<M> {
    /// Request buffers from the driver and map each of them.
    pub fn allocate<B>(backend: &B, fd: RawFd, config: &CaptureConfig) -> Result<Self>
    where
        B: VideoBackend<Mapping = M>,
    {
        let granted = backend
            .request_buffers(fd, config.buffer_request)
            .map_err(|err| match err.raw_os_error() {
                Some(libc::EBUSY) => {
                    log::error!("Buffers are already in use ({err})");
                    CaptureError::Busy
                }
                Some(libc::EINVAL) => {
                    log::error!("Memory mapping is not supported ({err})");
                    CaptureError::IoMethodNotSupported
                }
                _ => {
                    log::error!("Failed to request buffers ({err})");
                    CaptureError::IoError
                }
            })?;

        let mut pool = Self {
            buffers: Vec::with_capacity(granted as usize),
        };
        if granted < config.min_buffers {
            log::error!(
                "Insufficient memory in video device driver: granted {granted} of {} buffers",
                config.buffer_request
            );
            pool.release(backend, fd);
            return Err(CaptureError::InsufficientMemory);
        }

        if let Err(err) = pool.map_all(backend, fd, granted) {
            pool.release(backend, fd);
            return Err(err);
        }
        Ok(pool)
    }

    fn map_all<B>(&mut self, backend: &B, fd: RawFd, granted: u32) -> Result<()>
    where
        B: VideoBackend<Mapping = M>,
    {
        for index in 0..granted {
            let info = backend.query_buffer(fd, index).map_err(|err| {
                log::error!("Failed to query buffer {index} ({err})");
                CaptureError::QueryBufferFailed
            })?;

            let mapping = backend.map_buffer(fd, &info).map_err(|err| {
                log::error!("Failed to map the video memory of buffer {index} ({err})");
                CaptureError::MemoryMappingFailed
            })?;

            log::debug!(
                "Mapped buffer {index}: {} bytes at offset {:#x}",
                info.length,
                info.offset
            );
            self.buffers.push(mapping);
        }
        Ok(())
    }

    /// Number of mapped buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Contents of buffer `index`, if it exists.
    pub fn buffer(&self, index: u32) -> Option<&[u8]> {
        self.buffers.get(index as usize).map(AsRef::as_ref)
    }

    /// Buffer indices in pool order.
    pub fn indices(&self) -> impl Iterator<Item = u32> {
        (0..self.buffers.len()).filter_map(|index| u32::try_from(index).ok())
    }

    /// Unmap every buffer in order, then return the buffers to the driver.
    ///
    /// Streaming must be off; the driver keeps queued buffers otherwise.
    pub fn release<B: VideoBackend>(self, backend: &B, fd: RawFd) {
        log::debug!("Releasing {} buffers", self.buffers.len());
        drop(self.buffers);

        if let Err(err) = backend.request_buffers(fd, 0) {
            log::warn!("Failed to free driver buffers ({err})");
        }
    }
}
