//! Streaming control and single-frame delivery.

use std::io;

use crate::error::{CaptureError, Result};
use crate::handle::DeviceHandle;
use crate::retry::RetryError;
use crate::traits::VideoBackend;

fn is_transient(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EAGAIN | libc::ENOMEM))
}

impl<B: VideoBackend> DeviceHandle<B> {
    /// Queue every buffer and turn streaming on. No-op while streaming.
    pub fn start(&mut self) -> Result<()> {
        if self.streaming {
            return Ok(());
        }
        let Some(pool) = self.pool.as_ref() else {
            log::error!("Can't start capture without buffers");
            return Err(CaptureError::InvalidStatus);
        };

        for index in pool.indices() {
            let queued = self.config.queue_retry.run(
                |attempt| {
                    let result = self.backend.queue_buffer(self.fd, index);
                    if let Err(err) = &result {
                        if is_transient(err) {
                            log::debug!(
                                "Queueing buffer {index} failed on attempt {attempt} ({err})"
                            );
                        }
                    }
                    result
                },
                is_transient,
            );

            let failure = match queued {
                Ok(()) => continue,
                Err(RetryError::Exhausted(err)) => {
                    log::error!("Retry failed while queueing buffer {index} ({err})");
                    CaptureError::QueueingFailed
                }
                Err(RetryError::Fatal(err)) if err.raw_os_error() == Some(libc::EIO) => {
                    log::error!("Internal I/O error in video device ({err})");
                    CaptureError::IoError
                }
                Err(RetryError::Fatal(err)) => {
                    log::error!("Failed to queue buffer {index} to start ({err})");
                    CaptureError::QueueingFailed
                }
            };

            // Stream-off hands already queued buffers back to the process.
            if index > 0 {
                if let Err(err) = self.backend.stream_off(self.fd) {
                    log::warn!("Failed to reclaim queued buffers ({err})");
                }
            }
            return Err(failure);
        }

        self.backend.stream_on(self.fd).map_err(|err| {
            log::error!("Failed to start streaming ({err})");
            CaptureError::StreamingFailed
        })?;

        self.streaming = true;
        log::debug!("Streaming started");
        Ok(())
    }

    /// Turn streaming off. A refused request is only logged.
    pub fn stop(&mut self) {
        if let Err(err) = self.backend.stream_off(self.fd) {
            log::warn!("Failed to stop streaming ({err})");
        }
        self.streaming = false;
    }

    /// Whether streaming is active.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Block until a frame is available and copy it into `dst`.
    ///
    /// Copies `min(dst.len(), buffer length)` bytes and returns that count.
    /// If streaming was off, it is started for this call and stopped again
    /// before returning. There is no overall deadline: the call waits until
    /// a frame arrives or the wait itself fails.
    pub fn capture(&mut self, dst: &mut [u8]) -> Result<usize> {
        let implicit = !self.streaming;
        if implicit {
            self.start()?;
        }

        let result = self.read_frame(dst);

        if implicit {
            self.stop();
        }
        result
    }

    fn read_frame(&self, dst: &mut [u8]) -> Result<usize> {
        loop {
            match self.backend.wait_readable(self.fd, self.config.wait_timeout) {
                Ok(true) => break,
                Ok(false) => continue,
                Err(err) => {
                    log::error!("Failed to wait for capturable frame ({err})");
                    return Err(CaptureError::IoError);
                }
            }
        }

        let dequeued = self.backend.dequeue_buffer(self.fd).map_err(|err| {
            log::error!("Failed to dequeue buffer ({err})");
            CaptureError::DequeueingFailed
        })?;

        let Some(buffer) = self.pool.as_ref().and_then(|pool| pool.buffer(dequeued.index)) else {
            log::error!("Driver returned unknown buffer {}", dequeued.index);
            return Err(CaptureError::DequeueingFailed);
        };

        let len = dst.len().min(buffer.len());
        if let (Some(out), Some(frame)) = (dst.get_mut(..len), buffer.get(..len)) {
            out.copy_from_slice(frame);
        }
        log::trace!(
            "Frame {}: buffer {} copied {len} of {} bytes",
            dequeued.sequence,
            dequeued.index,
            dequeued.bytes_used
        );

        self.backend
            .queue_buffer(self.fd, dequeued.index)
            .map_err(|err| {
                log::error!("Failed to queue buffer {} ({err})", dequeued.index);
                CaptureError::QueueingFailed
            })?;

        Ok(len)
    }
}
