//! V4L2 backend issuing raw requests through the v4l crate.
//!
//! Request codes and structure layouts come from `v4l::v4l2::vidioc` and
//! `v4l::v4l_sys`, so they match the running kernel's ABI.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;
use std::time::Duration;

use v4l::buffer::Type;
use v4l::capability::{Capabilities, Flags};
use v4l::memory::Memory;
use v4l::v4l2;
use v4l::v4l_sys::{
    v4l2_buffer, v4l2_capability, v4l2_crop, v4l2_cropcap, v4l2_fmtdesc, v4l2_format,
    v4l2_frmsizeenum, v4l2_pix_format, v4l2_rect, v4l2_requestbuffers,
};

use crate::format::FourCC;
use crate::traits::{
    BufferInfo, CropCapabilities, DequeuedBuffer, DeviceCapabilities, Format, FormatDescription,
    FrameSize, Rect, VideoBackend,
};

const CAPTURE: u32 = Type::VideoCapture as u32;
const MMAP: u32 = Memory::Mmap as u32;
const FIELD_INTERLACED: u32 = 4;
const FMT_FLAG_COMPRESSED: u32 = 0x0001;
const FRMSIZE_TYPE_DISCRETE: u32 = 1;

/// Issue one request. `$arg` must be the structure the kernel expects.
macro_rules! xioctl {
    ($fd:expr, $request:ident, $arg:expr) => {
        // SAFETY: `$arg` is a live, exclusively borrowed value of the type
        // `$request` is defined with.
        unsafe {
            v4l2::ioctl(
                $fd,
                v4l2::vidioc::$request,
                ptr::from_mut($arg).cast::<c_void>(),
            )
        }
    };
}

/// Request structures for which all-zero bytes are a valid value.
trait Plain: Copy {
    fn zeroed() -> Self {
        // SAFETY: implemented only for C structures made of integers,
        // arrays and unions thereof.
        unsafe { mem::zeroed() }
    }
}

impl Plain for v4l2_capability {}
impl Plain for v4l2_cropcap {}
impl Plain for v4l2_crop {}
impl Plain for v4l2_fmtdesc {}
impl Plain for v4l2_format {}
impl Plain for v4l2_pix_format {}
impl Plain for v4l2_requestbuffers {}
impl Plain for v4l2_buffer {}
impl Plain for v4l2_frmsizeenum {}

/// Backend talking to a real V4L2 character device.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Backend;

/// A buffer mapped with `mmap`; unmapped on drop.
#[derive(Debug)]
pub struct MappedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping belongs to the process, not to the thread that
// created it, and it is only read through `&self`.
unsafe impl Send for MappedBuffer {}

impl AsRef<[u8]> for MappedBuffer {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: `ptr` points to `len` readable bytes until `drop` runs.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        // SAFETY: the region was returned by `mmap` with this length and is
        // unmapped exactly once.
        let result = unsafe { v4l2::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) };
        if let Err(err) = result {
            log::warn!("Failed to unmap video buffer ({err})");
        }
    }
}

impl From<v4l2_rect> for Rect {
    fn from(rect: v4l2_rect) -> Self {
        Self {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
        }
    }
}

impl From<Rect> for v4l2_rect {
    fn from(rect: Rect) -> Self {
        Self {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
        }
    }
}

fn c_string(bytes: &[u8]) -> String {
    let text = bytes.split(|&b| b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(text).into_owned()
}

impl VideoBackend for V4l2Backend {
    type Mapping = MappedBuffer;

    fn open(&self, path: &Path) -> io::Result<RawFd> {
        v4l2::open(path, libc::O_RDONLY)
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        v4l2::close(fd)
    }

    fn query_capabilities(&self, fd: RawFd) -> io::Result<DeviceCapabilities> {
        let mut raw = v4l2_capability::zeroed();
        xioctl!(fd, VIDIOC_QUERYCAP, &mut raw)?;

        let caps = Capabilities::from(raw);
        Ok(DeviceCapabilities {
            can_capture: caps.capabilities.contains(Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(Flags::STREAMING),
            flags: format!("{:?}", caps.capabilities),
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            version: caps.version,
        })
    }

    fn query_crop_capabilities(&self, fd: RawFd) -> io::Result<CropCapabilities> {
        let mut raw = v4l2_cropcap {
            type_: CAPTURE,
            ..v4l2_cropcap::zeroed()
        };
        xioctl!(fd, VIDIOC_CROPCAP, &mut raw)?;

        Ok(CropCapabilities {
            bounds: raw.bounds.into(),
            default_rect: raw.defrect.into(),
        })
    }

    fn set_crop(&self, fd: RawFd, rect: Rect) -> io::Result<()> {
        let mut raw = v4l2_crop {
            type_: CAPTURE,
            c: rect.into(),
        };
        xioctl!(fd, VIDIOC_S_CROP, &mut raw)
    }

    fn enum_format(&self, fd: RawFd, index: u32) -> io::Result<FormatDescription> {
        let mut raw = v4l2_fmtdesc {
            index,
            type_: CAPTURE,
            ..v4l2_fmtdesc::zeroed()
        };
        xioctl!(fd, VIDIOC_ENUM_FMT, &mut raw)?;

        Ok(FormatDescription {
            index: raw.index,
            fourcc: FourCC::from_wire(raw.pixelformat),
            description: c_string(&raw.description),
            compressed: raw.flags & FMT_FLAG_COMPRESSED != 0,
        })
    }

    fn set_format(&self, fd: RawFd, format: &Format) -> io::Result<()> {
        let pix = v4l2_pix_format {
            width: format.width,
            height: format.height,
            pixelformat: format.pixel_format,
            field: FIELD_INTERLACED,
            ..v4l2_pix_format::zeroed()
        };
        let mut raw = v4l2_format::zeroed();
        raw.type_ = CAPTURE;
        raw.fmt.pix = pix;
        xioctl!(fd, VIDIOC_S_FMT, &mut raw)
    }

    fn get_format(&self, fd: RawFd) -> io::Result<Format> {
        let mut raw = v4l2_format::zeroed();
        raw.type_ = CAPTURE;
        xioctl!(fd, VIDIOC_G_FMT, &mut raw)?;

        // SAFETY: for a capture queue the kernel fills the `pix` member.
        let pix = unsafe { raw.fmt.pix };
        Ok(Format {
            width: pix.width,
            height: pix.height,
            pixel_format: pix.pixelformat,
            stride: pix.bytesperline,
            size: pix.sizeimage,
        })
    }

    fn request_buffers(&self, fd: RawFd, count: u32) -> io::Result<u32> {
        let mut raw = v4l2_requestbuffers {
            count,
            type_: CAPTURE,
            memory: MMAP,
            ..v4l2_requestbuffers::zeroed()
        };
        xioctl!(fd, VIDIOC_REQBUFS, &mut raw)?;
        Ok(raw.count)
    }

    fn query_buffer(&self, fd: RawFd, index: u32) -> io::Result<BufferInfo> {
        let mut raw = v4l2_buffer {
            index,
            type_: CAPTURE,
            memory: MMAP,
            ..v4l2_buffer::zeroed()
        };
        xioctl!(fd, VIDIOC_QUERYBUF, &mut raw)?;

        // SAFETY: `offset` is the active member for MMAP buffers.
        let offset = unsafe { raw.m.offset };
        Ok(BufferInfo {
            index: raw.index,
            length: raw.length,
            offset,
        })
    }

    fn map_buffer(&self, fd: RawFd, info: &BufferInfo) -> io::Result<MappedBuffer> {
        let len = info.length as usize;
        let offset = libc::off_t::try_from(info.offset)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

        // SAFETY: a fresh shared read-only mapping of a driver buffer; the
        // kernel validates `offset` and `len` against the descriptor.
        let addr = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                fd,
                offset,
            )?
        };

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))?;
        Ok(MappedBuffer { ptr, len })
    }

    fn queue_buffer(&self, fd: RawFd, index: u32) -> io::Result<()> {
        let mut raw = v4l2_buffer {
            index,
            type_: CAPTURE,
            memory: MMAP,
            ..v4l2_buffer::zeroed()
        };
        xioctl!(fd, VIDIOC_QBUF, &mut raw)
    }

    fn dequeue_buffer(&self, fd: RawFd) -> io::Result<DequeuedBuffer> {
        let mut raw = v4l2_buffer {
            type_: CAPTURE,
            memory: MMAP,
            ..v4l2_buffer::zeroed()
        };
        xioctl!(fd, VIDIOC_DQBUF, &mut raw)?;

        Ok(DequeuedBuffer {
            index: raw.index,
            bytes_used: raw.bytesused,
            sequence: raw.sequence,
        })
    }

    fn stream_on(&self, fd: RawFd) -> io::Result<()> {
        let mut typ = CAPTURE;
        xioctl!(fd, VIDIOC_STREAMON, &mut typ)
    }

    fn stream_off(&self, fd: RawFd) -> io::Result<()> {
        let mut typ = CAPTURE;
        xioctl!(fd, VIDIOC_STREAMOFF, &mut typ)
    }

    fn wait_readable(&self, fd: RawFd, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }
        if ready == 0 {
            return Ok(false);
        }
        if pfd.revents & libc::POLLIN == 0 {
            // POLLERR/POLLNVAL without data: the queue is not streaming.
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(true)
    }

    fn enum_frame_size(&self, fd: RawFd, pixel_format: u32, index: u32) -> io::Result<FrameSize> {
        let mut raw = v4l2_frmsizeenum {
            index,
            pixel_format,
            ..v4l2_frmsizeenum::zeroed()
        };
        xioctl!(fd, VIDIOC_ENUM_FRAMESIZES, &mut raw)?;

        // SAFETY: `type_` selects the active union member.
        let size = unsafe {
            if raw.type_ == FRMSIZE_TYPE_DISCRETE {
                let discrete = raw.__bindgen_anon_1.discrete;
                FrameSize::Discrete {
                    width: discrete.width,
                    height: discrete.height,
                }
            } else {
                let stepwise = raw.__bindgen_anon_1.stepwise;
                FrameSize::Stepwise {
                    min_width: stepwise.min_width,
                    max_width: stepwise.max_width,
                    min_height: stepwise.min_height,
                    max_height: stepwise.max_height,
                }
            }
        };
        Ok(size)
    }
}
