//! Simulated V4L2 device for testing without hardware.
//!
//! The mock keeps the kernel's side of the protocol (buffer queue, streaming
//! state, mappings) in a shared [`MockState`] so tests can both script
//! failures and inspect what the engine did.

#![allow(missing_docs)]

use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::format::{FourCC, PixelFormat};
use crate::traits::{
    BufferInfo, CropCapabilities, DequeuedBuffer, DeviceCapabilities, Format, FormatDescription,
    FrameSize, Rect, VideoBackend,
};

/// Descriptor handed out by the mock.
pub const MOCK_FD: RawFd = 7;

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Kernel-side state of the simulated device.
#[derive(Debug)]
pub struct MockState {
    pub capabilities: DeviceCapabilities,
    pub crop_capabilities: CropCapabilities,
    pub formats: Vec<FormatDescription>,
    pub frame_sizes: Vec<FrameSize>,
    pub format: Format,
    pub pattern: TestPattern,
    /// Format the driver settles on regardless of the request.
    pub forced_format: Option<Format>,
    pub granted_buffers: u32,

    // Scripted failures: an errno to return.
    pub open_error: Option<i32>,
    pub querycap_error: Option<i32>,
    pub cropcap_error: Option<i32>,
    pub crop_error: Option<i32>,
    pub enum_format_error: Option<(u32, i32)>,
    pub set_format_error: Option<i32>,
    pub request_error: Option<i32>,
    pub query_error_at: Option<(u32, i32)>,
    pub map_error_at: Option<(u32, i32)>,
    /// Per-call answers for `VIDIOC_QBUF`; empty means success.
    pub queue_script: VecDeque<i32>,
    /// Refuse queueing one buffer index with an errno.
    pub queue_error_at: Option<(u32, i32)>,
    pub dequeue_error: Option<i32>,
    pub stream_on_error: Option<i32>,
    pub stream_off_error: Option<i32>,
    pub wait_error: Option<i32>,
    /// Number of waits that time out before data is reported ready.
    pub timeouts_before_ready: u32,
    /// Per-call answers for `close`; empty means success.
    pub close_script: VecDeque<i32>,

    // Observations.
    pub open_fds: u32,
    pub crop: Option<Rect>,
    pub requested_format: Option<Format>,
    /// Buffers the driver holds after the last `REQBUFS`.
    pub allocated: u32,
    /// Counts passed to every `REQBUFS`.
    pub request_calls: Vec<u32>,
    pub mapped: Vec<u32>,
    pub unmapped: Vec<u32>,
    pub queued: VecDeque<u32>,
    pub streaming: bool,
    pub queue_calls: u32,
    pub stream_on_calls: u32,
    pub stream_off_calls: u32,
    pub wait_calls: u32,
    pub close_calls: u32,
    pub sequence: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                version: (6, 1, 0),
                can_capture: true,
                can_stream: true,
                flags: "VIDEO_CAPTURE | STREAMING".to_owned(),
            },
            crop_capabilities: CropCapabilities {
                bounds: Rect {
                    left: 0,
                    top: 0,
                    width: 1280,
                    height: 720,
                },
                default_rect: Rect {
                    left: 0,
                    top: 0,
                    width: 640,
                    height: 480,
                },
            },
            formats: vec![
                FormatDescription {
                    index: 0,
                    fourcc: FourCC::new(b"YUYV"),
                    description: "YUYV 4:2:2".to_owned(),
                    compressed: false,
                },
                FormatDescription {
                    index: 1,
                    fourcc: FourCC::new(b"MJPG"),
                    description: "Motion-JPEG".to_owned(),
                    compressed: true,
                },
            ],
            frame_sizes: vec![
                FrameSize::Discrete {
                    width: 640,
                    height: 480,
                },
                FrameSize::Discrete {
                    width: 320,
                    height: 240,
                },
            ],
            format: Format::default(),
            pattern: TestPattern::ColorBars,
            forced_format: None,
            granted_buffers: 4,
            open_error: None,
            querycap_error: None,
            cropcap_error: None,
            crop_error: None,
            enum_format_error: None,
            set_format_error: None,
            request_error: None,
            query_error_at: None,
            map_error_at: None,
            queue_script: VecDeque::new(),
            queue_error_at: None,
            dequeue_error: None,
            stream_on_error: None,
            stream_off_error: None,
            wait_error: None,
            timeouts_before_ready: 0,
            close_script: VecDeque::new(),
            open_fds: 0,
            crop: None,
            requested_format: None,
            allocated: 0,
            request_calls: Vec::new(),
            mapped: Vec::new(),
            unmapped: Vec::new(),
            queued: VecDeque::new(),
            streaming: false,
            queue_calls: 0,
            stream_on_calls: 0,
            stream_off_calls: 0,
            wait_calls: 0,
            close_calls: 0,
            sequence: 0,
        }
    }
}

impl MockState {
    /// Buffers currently mapped and not yet unmapped.
    pub fn live_mappings(&self) -> usize {
        self.mapped.len() - self.unmapped.len()
    }
}

/// Mock backend sharing its state with every mapping it hands out.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    /// Create a mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the simulated kernel state.
    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    /// Script failures or change the simulated device.
    pub fn state_mut(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }
}

fn fail(errno: Option<i32>) -> io::Result<()> {
    errno.map_or(Ok(()), |code| Err(io::Error::from_raw_os_error(code)))
}

/// Bytes per frame the simulated driver reports for a format.
fn frame_layout(width: u32, height: u32, pixel_format: u32) -> (u32, u32) {
    match PixelFormat::from_wire(pixel_format) {
        Some(PixelFormat::Rgb32 | PixelFormat::Bgr32) => (width * 4, width * height * 4),
        Some(PixelFormat::Yuv420) => (width, width * height * 3 / 2),
        Some(PixelFormat::Yuv410) => (width, width * height * 9 / 8),
        Some(PixelFormat::Yuv422P) => (width, width * height * 2),
        _ => (width * 2, width * height * 2),
    }
}

impl VideoBackend for MockBackend {
    type Mapping = MockMapping;

    fn open(&self, _path: &Path) -> io::Result<RawFd> {
        let mut state = self.state.borrow_mut();
        if let Some(code) = state.open_error {
            return Err(io::Error::from_raw_os_error(code));
        }
        state.open_fds += 1;
        Ok(MOCK_FD)
    }

    fn close(&self, _fd: RawFd) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.close_calls += 1;
        if let Some(code) = state.close_script.pop_front() {
            return Err(io::Error::from_raw_os_error(code));
        }
        state.open_fds = state.open_fds.saturating_sub(1);
        Ok(())
    }

    fn query_capabilities(&self, _fd: RawFd) -> io::Result<DeviceCapabilities> {
        let state = self.state.borrow();
        fail(state.querycap_error)?;
        Ok(state.capabilities.clone())
    }

    fn query_crop_capabilities(&self, _fd: RawFd) -> io::Result<CropCapabilities> {
        let state = self.state.borrow();
        fail(state.cropcap_error)?;
        Ok(state.crop_capabilities)
    }

    fn set_crop(&self, _fd: RawFd, rect: Rect) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        fail(state.crop_error)?;
        state.crop = Some(rect);
        Ok(())
    }

    fn enum_format(&self, _fd: RawFd, index: u32) -> io::Result<FormatDescription> {
        let state = self.state.borrow();
        if let Some((at, code)) = state.enum_format_error {
            if at == index {
                return Err(io::Error::from_raw_os_error(code));
            }
        }
        state
            .formats
            .get(index as usize)
            .cloned()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
    }

    fn set_format(&self, _fd: RawFd, format: &Format) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.requested_format = Some(*format);
        fail(state.set_format_error)?;
        if state.allocated > 0 {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }

        let (stride, size) = frame_layout(format.width, format.height, format.pixel_format);
        state.format = state.forced_format.unwrap_or(Format {
            stride,
            size,
            ..*format
        });
        Ok(())
    }

    fn get_format(&self, _fd: RawFd) -> io::Result<Format> {
        Ok(self.state.borrow().format)
    }

    fn request_buffers(&self, _fd: RawFd, count: u32) -> io::Result<u32> {
        let mut state = self.state.borrow_mut();
        state.request_calls.push(count);
        if count > 0 {
            fail(state.request_error)?;
        }
        if state.live_mappings() > 0 || state.streaming {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        state.allocated = count.min(state.granted_buffers);
        Ok(state.allocated)
    }

    fn query_buffer(&self, _fd: RawFd, index: u32) -> io::Result<BufferInfo> {
        let state = self.state.borrow();
        if let Some((at, code)) = state.query_error_at {
            if at == index {
                return Err(io::Error::from_raw_os_error(code));
            }
        }
        Ok(BufferInfo {
            index,
            length: state.format.size,
            offset: index * state.format.size,
        })
    }

    fn map_buffer(&self, _fd: RawFd, info: &BufferInfo) -> io::Result<MockMapping> {
        let mut state = self.state.borrow_mut();
        if let Some((at, code)) = state.map_error_at {
            if at == info.index {
                return Err(io::Error::from_raw_os_error(code));
            }
        }
        state.mapped.push(info.index);

        let mut data = vec![0u8; info.length as usize];
        fill_pattern(&mut data, state.format.width, state.pattern);
        Ok(MockMapping {
            index: info.index,
            data,
            state: Rc::clone(&self.state),
        })
    }

    fn queue_buffer(&self, _fd: RawFd, index: u32) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.queue_calls += 1;
        if let Some(code) = state.queue_script.pop_front() {
            return Err(io::Error::from_raw_os_error(code));
        }
        if let Some((at, code)) = state.queue_error_at {
            if at == index {
                return Err(io::Error::from_raw_os_error(code));
            }
        }
        if state.queued.contains(&index) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        state.queued.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&self, _fd: RawFd) -> io::Result<DequeuedBuffer> {
        let mut state = self.state.borrow_mut();
        fail(state.dequeue_error)?;
        if !state.streaming {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let index = state
            .queued
            .pop_front()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EAGAIN))?;
        let sequence = state.sequence;
        state.sequence += 1;
        Ok(DequeuedBuffer {
            index,
            bytes_used: state.format.size,
            sequence,
        })
    }

    fn stream_on(&self, _fd: RawFd) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.stream_on_calls += 1;
        fail(state.stream_on_error)?;
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&self, _fd: RawFd) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.stream_off_calls += 1;
        fail(state.stream_off_error)?;
        state.streaming = false;
        state.queued.clear();
        Ok(())
    }

    fn wait_readable(&self, _fd: RawFd, _timeout: Duration) -> io::Result<bool> {
        let mut state = self.state.borrow_mut();
        state.wait_calls += 1;
        fail(state.wait_error)?;
        if !state.streaming || state.queued.is_empty() {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        if state.timeouts_before_ready > 0 {
            state.timeouts_before_ready -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn enum_frame_size(&self, _fd: RawFd, pixel_format: u32, index: u32) -> io::Result<FrameSize> {
        let state = self.state.borrow();
        let supported = state
            .formats
            .iter()
            .any(|desc| desc.fourcc.to_wire() == pixel_format);
        if !supported {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        state
            .frame_sizes
            .get(index as usize)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
    }
}

/// A simulated mapping; records its unmapping in the shared state.
#[derive(Debug)]
pub struct MockMapping {
    index: u32,
    data: Vec<u8>,
    state: Rc<RefCell<MockState>>,
}

impl AsRef<[u8]> for MockMapping {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockMapping {
    fn drop(&mut self) {
        self.state.borrow_mut().unmapped.push(self.index);
    }
}

/// Fill a buffer with a YUYV test pattern.
pub fn fill_pattern(data: &mut [u8], width: u32, pattern: TestPattern) {
    match pattern {
        TestPattern::ColorBars => generate_color_bars(data, width),
        TestPattern::Solid(y, u, v) => generate_solid(data, y, u, v),
    }
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];

    let row_bytes = (width as usize * 2).max(4);
    let bar_width = (width as usize / 8).max(1);

    for (i, quad) in data.chunks_exact_mut(4).enumerate() {
        let x = (i * 4 % row_bytes) / 2;
        let (y_val, u_val, v_val) = bars[(x / bar_width).min(7)];
        quad.copy_from_slice(&[y_val, u_val, y_val, v_val]);
    }
}

/// Generate solid color YUYV frame.
fn generate_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for quad in data.chunks_exact_mut(4) {
        quad.copy_from_slice(&[y, u, y, v]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let backend = MockBackend::new();
        let caps = backend.query_capabilities(MOCK_FD).expect("querycap should succeed");
        assert_eq!(caps.driver, "mock");
        assert!(caps.can_capture);
        assert!(caps.can_stream);
    }

    #[test]
    fn test_mock_format_negotiation() {
        let backend = MockBackend::new();
        let request = Format::request(640, 480, PixelFormat::Yuyv.wire());
        backend.set_format(MOCK_FD, &request).expect("set_format should succeed");

        let format = backend.get_format(MOCK_FD).expect("get_format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.stride, 1280);
        assert_eq!(format.size, 640 * 480 * 2);
    }

    #[test]
    fn test_mock_queue_protocol() {
        let backend = MockBackend::new();
        backend.queue_buffer(MOCK_FD, 0).expect("qbuf should succeed");
        backend.queue_buffer(MOCK_FD, 1).expect("qbuf should succeed");
        assert!(backend.queue_buffer(MOCK_FD, 1).is_err(), "double queue must fail");

        backend.stream_on(MOCK_FD).expect("streamon should succeed");
        let buf = backend.dequeue_buffer(MOCK_FD).expect("dqbuf should succeed");
        assert_eq!(buf.index, 0);
        assert_eq!(buf.sequence, 0);

        backend.stream_off(MOCK_FD).expect("streamoff should succeed");
        assert!(backend.state().queued.is_empty());
    }

    #[test]
    fn test_mock_format_locked_while_buffers_held() {
        let backend = MockBackend::new();
        let request = Format::request(640, 480, PixelFormat::Yuyv.wire());
        backend.set_format(MOCK_FD, &request).expect("set_format should succeed");
        assert_eq!(backend.request_buffers(MOCK_FD, 4).ok(), Some(4));

        let err = backend
            .set_format(MOCK_FD, &request)
            .expect_err("set_format should be refused");
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));

        assert_eq!(backend.request_buffers(MOCK_FD, 0).ok(), Some(0));
        backend.set_format(MOCK_FD, &request).expect("set_format should succeed");
    }

    #[test]
    fn test_color_bars_pattern() {
        let mut data = vec![0u8; 640 * 480 * 2];
        fill_pattern(&mut data, 640, TestPattern::ColorBars);

        // First bar should be white (Y=235), last bar black (Y=16)
        assert_eq!(data[0], 235);
        assert_eq!(data[640 * 2 - 4], 16);
        // Second row starts with white again
        assert_eq!(data[640 * 2], 235);
    }

    #[test]
    fn test_solid_pattern() {
        let mut data = vec![0u8; 64 * 64 * 2];
        fill_pattern(&mut data, 64, TestPattern::Solid(128, 64, 192));

        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);
        assert_eq!(data[1], 64);
        assert_eq!(data[3], 192);
    }
}
