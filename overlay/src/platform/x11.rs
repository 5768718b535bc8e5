//! X11 surface for the OSD
//!
//! An override-redirect window at the root visual whose bounding shape is
//! rebuilt from the frame mask on every present. Pixels travel through
//! MIT-SHM when the server offers it and plain `PutImage` otherwise.

use std::fs::File;
use std::os::fd::AsFd;
use std::sync::Arc;

use rustix::fs::{MemfdFlags, memfd_create};
use rustix::mm::{MapFlags, ProtFlags, mmap};
use x11rb::atom_manager;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::Event;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::shm::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::colour::Rgb;
use crate::error::{OsdError, Result};
use crate::geometry::ScreenRect;
use crate::renderer::Frame;

use super::{EventSource, MonitorInfo, Surface, SurfaceEvent};

/// GNOME legacy layer that keeps a window above normal ones
const WIN_LAYER_ONTOP: u32 = 6;
const NET_WM_STATE_ADD: u32 = 1;

atom_manager! {
    pub AtomCollection: AtomCollectionCookie {
        _WIN_SUPPORTING_WM_CHECK,
        _WIN_LAYER,
        _NET_SUPPORTED,
        _NET_WM_STATE,
        _NET_WM_STATE_ABOVE,
        _NET_WM_STATE_STAYS_ON_TOP,
        _NET_WM_NAME,
        UTF8_STRING,
    }
}

fn host<E: std::fmt::Display>(e: E) -> OsdError {
    OsdError::Host(e.to_string())
}

/// Monitors reported by RandR, empty when the extension is missing
fn query_monitors(conn: &RustConnection, root: Window) -> Vec<MonitorInfo> {
    let Ok(cookie) = conn.randr_get_monitors(root, true) else {
        return Vec::new();
    };
    let Ok(monitors) = cookie.reply() else {
        return Vec::new();
    };

    monitors
        .monitors
        .iter()
        .enumerate()
        .map(|(idx, mon)| {
            let name = conn
                .get_atom_name(mon.name)
                .ok()
                .and_then(|r| r.reply().ok())
                .map(|r| String::from_utf8_lossy(&r.name).to_string())
                .unwrap_or_else(|| format!("Monitor {}", idx + 1));

            MonitorInfo {
                id: name.clone(),
                name,
                x: mon.x as i32,
                y: mon.y as i32,
                width: mon.width as u32,
                height: mon.height as u32,
                is_primary: mon.primary,
            }
        })
        .collect()
}

/// SHM buffer for efficient pixel transfer
struct ShmBuffer {
    seg_id: shm::Seg,
    ptr: *mut u8,
    size: usize,
}

// SAFETY: the mapping is only touched by the surface, whose calls the engine serializes
unsafe impl Send for ShmBuffer {}

impl ShmBuffer {
    fn create(conn: &RustConnection, width: u32, height: u32) -> Result<Self> {
        let size = (width as usize * height as usize * 4).max(4);

        let fd = memfd_create(c"osd-x11-buffer", MemfdFlags::CLOEXEC).map_err(host)?;
        rustix::fs::ftruncate(&fd, size as u64).map_err(host)?;

        // SAFETY: fresh shared mapping of a memfd we just sized
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd.as_fd(),
                0,
            )
            .map_err(|_| OsdError::OutOfMemory)?
        };

        let seg_id = conn.generate_id().map_err(host)?;
        // x11rb shm_attach_fd takes ownership of the fd
        let attached = conn
            .shm_attach_fd(seg_id, File::from(fd), false)
            .map_err(host)
            .and_then(|cookie| cookie.check().map_err(host));
        if let Err(e) = attached {
            // SAFETY: ptr/size come from the mmap above and nothing else holds them
            unsafe {
                rustix::mm::munmap(ptr, size).ok();
            }
            return Err(e);
        }

        Ok(Self {
            seg_id,
            ptr: ptr as *mut u8,
            size,
        })
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is a live mapping of `size` bytes owned by self
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    fn release(&self, conn: &RustConnection) {
        let _ = conn.shm_detach(self.seg_id);
        // SAFETY: ptr/size describe the mapping created in `create`
        unsafe {
            rustix::mm::munmap(self.ptr as *mut _, self.size).ok();
        }
    }
}

/// How pixels reach the window
enum Transfer {
    Shm(ShmBuffer),
    /// `PutImage` in row strips; the Vec is reused between presents
    Plain(Vec<u8>),
}

/// Copy premultiplied RGBA rows into BGRX
fn convert_rows(frame: &Frame, y: u32, height: u32, out: &mut [u8]) {
    let stride = frame.width() as usize * 4;
    let start = y as usize * stride;
    let end = (y + height) as usize * stride;
    let src = &frame.pixmap().data()[start..end];
    for (dst, px) in out.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        dst[0] = px[2];
        dst[1] = px[1];
        dst[2] = px[0];
        dst[3] = 0;
    }
}

pub struct X11Surface {
    conn: Arc<RustConnection>,
    root: Window,
    root_area: ScreenRect,
    window: Window,
    gc: Gcontext,
    colormap: Colormap,
    depth: u8,
    width: u32,
    height: u32,
    transfer: Transfer,
    events: Arc<X11Events>,
}

impl X11Surface {
    /// Connect to `$DISPLAY` and create the (unmapped) overlay window
    pub fn connect(title: &str) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).map_err(|e| {
            tracing::warn!(error = %e, "Failed to connect to X server");
            OsdError::NoDisplay
        })?;

        // The non-rectangular window is impossible without the shape extension
        conn.shape_query_version()
            .map_err(|_| OsdError::ShapeUnsupported)?
            .reply()
            .map_err(|_| OsdError::ShapeUnsupported)?;

        let shm_available = conn
            .shm_query_version()
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some();

        let atoms = AtomCollection::new(&conn)
            .map_err(host)?
            .reply()
            .map_err(host)?;

        let setup = conn.setup();
        let screen = &setup.roots[screen_num];
        let root = screen.root;
        let depth = screen.root_depth;
        let visual = screen.root_visual;
        let colormap = screen.default_colormap;
        let root_area = ScreenRect {
            x: 0,
            y: 0,
            width: screen.width_in_pixels as u32,
            height: screen.height_in_pixels as u32,
        };

        let bits_per_pixel = setup
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .map(|f| f.bits_per_pixel);
        if bits_per_pixel != Some(32) {
            return Err(OsdError::Host(format!(
                "unsupported root visual: depth {depth}, {bits_per_pixel:?} bits per pixel"
            )));
        }

        let (width, height) = (root_area.width.max(1), 1);
        let window = conn.generate_id().map_err(host)?;
        let win_aux = CreateWindowAux::new()
            .background_pixel(0)
            .border_pixel(0)
            .event_mask(EventMask::EXPOSURE)
            .override_redirect(1);
        conn.create_window(
            depth,
            window,
            root,
            0,
            0,
            width as u16,
            height as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &win_aux,
        )
        .map_err(host)?;

        let gc = conn.generate_id().map_err(host)?;
        conn.create_gc(gc, window, &CreateGCAux::new().graphics_exposures(0))
            .map_err(host)?;

        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )
        .map_err(host)?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_NAME,
            atoms.UTF8_STRING,
            title.as_bytes(),
        )
        .map_err(host)?;

        let transfer = if shm_available {
            match ShmBuffer::create(&conn, width, height) {
                Ok(buffer) => Transfer::Shm(buffer),
                Err(e) => {
                    tracing::debug!(error = %e, "SHM unavailable, using PutImage");
                    Transfer::Plain(Vec::new())
                }
            }
        } else {
            Transfer::Plain(Vec::new())
        };

        let conn = Arc::new(conn);
        let events = Arc::new(X11Events {
            conn: conn.clone(),
            window,
        });

        let surface = Self {
            conn,
            root,
            root_area,
            window,
            gc,
            colormap,
            depth,
            width,
            height,
            transfer,
            events,
        };

        surface.request_stay_on_top(&atoms)?;
        surface.conn.flush().map_err(host)?;

        tracing::info!(
            window = surface.window,
            depth,
            shm = matches!(surface.transfer, Transfer::Shm(_)),
            "Created X11 overlay window"
        );
        Ok(surface)
    }

    fn root_property(&self, property: Atom) -> Option<GetPropertyReply> {
        self.conn
            .get_property(false, self.root, property, AtomEnum::ANY, 0, 1024)
            .ok()?
            .reply()
            .ok()
            .filter(|reply| reply.type_ != x11rb::NONE)
    }

    fn send_to_root(&self, message_type: Atom, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent::new(32, self.window, message_type, data);
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .map_err(host)?;
        Ok(())
    }

    /// Ask the window manager to keep the window above others
    ///
    /// The GNOME layer protocol is tried first, then EWMH. Neither being
    /// available is not an error.
    fn request_stay_on_top(&self, atoms: &AtomCollection) -> Result<()> {
        if self.root_property(atoms._WIN_SUPPORTING_WM_CHECK).is_some() {
            tracing::debug!("Requesting stay-on-top via _WIN_LAYER");
            return self.send_to_root(atoms._WIN_LAYER, [WIN_LAYER_ONTOP, 0, 0, 0, 0]);
        }

        let supported: Vec<Atom> = self
            .root_property(atoms._NET_SUPPORTED)
            .and_then(|reply| reply.value32().map(|v| v.collect()))
            .unwrap_or_default();
        let state = [atoms._NET_WM_STATE_ABOVE, atoms._NET_WM_STATE_STAYS_ON_TOP]
            .into_iter()
            .find(|atom| supported.contains(atom));

        match state {
            Some(state) => {
                tracing::debug!(atom = state, "Requesting stay-on-top via _NET_WM_STATE");
                self.conn
                    .change_property32(
                        PropMode::REPLACE,
                        self.window,
                        atoms._NET_WM_STATE,
                        AtomEnum::ATOM,
                        &[state],
                    )
                    .map_err(host)?;
                self.send_to_root(atoms._NET_WM_STATE, [NET_WM_STATE_ADD, state, 0, 0, 0])
            }
            None => {
                tracing::warn!("Window manager offers no stay-on-top protocol");
                Ok(())
            }
        }
    }

    fn put_plain(&mut self, frame: &Frame, y: u32, height: u32) -> Result<()> {
        let row_bytes = self.width as usize * 4;
        // Leave room for the PutImage request header
        let max_rows = ((self.conn.maximum_request_bytes().saturating_sub(32)) / row_bytes).max(1);

        let Transfer::Plain(buffer) = &mut self.transfer else {
            return Ok(());
        };
        let mut row = y;
        while row < y + height {
            let rows = (max_rows as u32).min(y + height - row);
            buffer.resize(rows as usize * row_bytes, 0);
            convert_rows(frame, row, rows, buffer);
            self.conn
                .put_image(
                    ImageFormat::Z_PIXMAP,
                    self.window,
                    self.gc,
                    self.width as u16,
                    rows as u16,
                    0,
                    row as i16,
                    0,
                    self.depth,
                    buffer,
                )
                .map_err(host)?;
            row += rows;
        }
        Ok(())
    }

    fn put_shm(&mut self, frame: &Frame, y: u32, height: u32) -> Result<()> {
        let Transfer::Shm(buffer) = &mut self.transfer else {
            return Ok(());
        };
        let stride = self.width as usize * 4;
        let start = y as usize * stride;
        let end = (y + height) as usize * stride;
        convert_rows(frame, y, height, &mut buffer.as_mut_slice()[start..end]);

        self.conn
            .shm_put_image(
                self.window,
                self.gc,
                self.width as u16,
                self.height as u16,
                0,
                y as u16,
                self.width as u16,
                height as u16,
                0,
                y as i16,
                self.depth,
                ImageFormat::Z_PIXMAP.into(),
                false,
                buffer.seg_id,
                0,
            )
            .map_err(host)?;
        // The server reads the segment asynchronously; wait before it is reused
        self.conn
            .get_input_focus()
            .map_err(host)?
            .reply()
            .map_err(host)?;
        Ok(())
    }

    /// Apply the frame mask as the bounding shape
    fn apply_shape(&self, frame: &Frame) -> Result<()> {
        let rects: Vec<Rectangle> = frame
            .mask()
            .rects()
            .into_iter()
            .map(|r| Rectangle {
                x: r.x as i16,
                y: r.y as i16,
                width: r.width as u16,
                height: r.height as u16,
            })
            .collect();

        // Each rectangle is 8 bytes on the wire
        let per_request = (self.conn.maximum_request_bytes().saturating_sub(16) / 8).max(1);
        let mut chunks = rects.chunks(per_request);
        let first = chunks.next().unwrap_or(&[]);
        self.conn
            .shape_rectangles(
                shape::SO::SET,
                shape::SK::BOUNDING,
                ClipOrdering::UNSORTED,
                self.window,
                0,
                0,
                first,
            )
            .map_err(host)?;
        for chunk in chunks {
            self.conn
                .shape_rectangles(
                    shape::SO::UNION,
                    shape::SK::BOUNDING,
                    ClipOrdering::UNSORTED,
                    self.window,
                    0,
                    0,
                    chunk,
                )
                .map_err(host)?;
        }
        Ok(())
    }
}

impl Surface for X11Surface {
    fn root_area(&self) -> ScreenRect {
        self.root_area
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        query_monitors(&self.conn, self.root)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.width && height == self.height {
            return Ok(());
        }

        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(OsdError::Host(format!(
                "window size {width}x{height} exceeds the protocol limit"
            )));
        }

        // Buffers are only swapped once the window has taken the new size
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new().width(width).height(height),
            )
            .map_err(host)?;
        self.conn.flush().map_err(host)?;

        if let Transfer::Shm(old) = &self.transfer {
            old.release(&self.conn);
            self.transfer = match ShmBuffer::create(&self.conn, width, height) {
                Ok(buffer) => Transfer::Shm(buffer),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to recreate SHM buffer, using PutImage");
                    Transfer::Plain(Vec::new())
                }
            };
        }

        self.width = width;
        self.height = height;
        tracing::debug!(width, height, "Resized overlay window");
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.conn
            .configure_window(self.window, &ConfigureWindowAux::new().x(x).y(y))
            .map_err(host)?;
        self.conn.flush().map_err(host)?;
        Ok(())
    }

    fn map(&mut self) -> Result<()> {
        self.conn.map_window(self.window).map_err(host)?;
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )
            .map_err(host)?;
        self.conn.flush().map_err(host)?;
        Ok(())
    }

    fn unmap(&mut self) -> Result<()> {
        self.conn.unmap_window(self.window).map_err(host)?;
        self.conn.flush().map_err(host)?;
        Ok(())
    }

    fn present(&mut self, frame: &Frame, y: u32, height: u32) -> Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(OsdError::Host(format!(
                "frame {}x{} does not match window {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let y = y.min(self.height);
        let height = height.min(self.height - y);

        if height > 0 {
            match self.transfer {
                Transfer::Shm(_) => self.put_shm(frame, y, height)?,
                Transfer::Plain(_) => self.put_plain(frame, y, height)?,
            }
        }
        self.apply_shape(frame)?;
        self.conn.flush().map_err(host)?;
        Ok(())
    }

    fn lookup_colour(&mut self, name: &str) -> Option<Rgb> {
        let reply = self
            .conn
            .lookup_color(self.colormap, name.as_bytes())
            .ok()?
            .reply()
            .ok()?;
        Some(Rgb::from_u16(
            reply.exact_red,
            reply.exact_green,
            reply.exact_blue,
        ))
    }

    fn set_click_through(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            // Empty input region - clicks pass through
            self.conn
                .shape_rectangles(
                    shape::SO::SET,
                    shape::SK::INPUT,
                    ClipOrdering::UNSORTED,
                    self.window,
                    0,
                    0,
                    &[],
                )
                .map_err(host)?;
        } else {
            // Back to the default input region (follows the bounding shape)
            self.conn
                .shape_mask(
                    shape::SO::SET,
                    shape::SK::INPUT,
                    self.window,
                    0,
                    0,
                    x11rb::NONE,
                )
                .map_err(host)?;
        }
        self.conn.flush().map_err(host)?;
        Ok(())
    }

    fn events(&self) -> Arc<dyn EventSource> {
        self.events.clone()
    }
}

impl Drop for X11Surface {
    fn drop(&mut self) {
        if let Transfer::Shm(buffer) = &self.transfer {
            buffer.release(&self.conn);
        }
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.free_gc(self.gc);
        let _ = self.conn.flush();
        tracing::info!(window = self.window, "Destroyed X11 overlay window");
    }
}

/// Expose events for the overlay window
pub struct X11Events {
    conn: Arc<RustConnection>,
    window: Window,
}

impl EventSource for X11Events {
    fn wait(&self) -> SurfaceEvent {
        match self.conn.wait_for_event() {
            // Sent events carry the high bit; only wake-ups are sent to us
            Ok(Event::Expose(e)) if e.window == self.window && e.response_type & 0x80 == 0 => {
                SurfaceEvent::Damaged {
                    y: e.y as u32,
                    height: e.height as u32,
                    count: e.count as u32,
                }
            }
            Ok(_) => SurfaceEvent::Other,
            Err(e) => {
                tracing::warn!(error = %e, "X11 connection lost");
                SurfaceEvent::Closed
            }
        }
    }

    fn wake(&self) {
        let event = ExposeEvent {
            response_type: EXPOSE_EVENT,
            sequence: 0,
            window: self.window,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            count: 0,
        };
        let _ = self
            .conn
            .send_event(false, self.window, EventMask::EXPOSURE, event);
        let _ = self.conn.flush();
    }
}
