//! On-screen display engine
//!
//! Renders a fixed number of text, percentage-bar and slider rows in a
//! borderless, shaped, always-on-top window that hides itself after a timeout.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine                           │
//! │        Osd: line buffer, style, visibility          │
//! │        (one lock, two background reactors)          │
//! ├─────────────────────────────────────────────────────┤
//! │                    reactor                          │
//! │      event reactor (repaint on host damage)         │
//! │      timeout reactor (auto-hide on deadline)        │
//! ├─────────────────────────────────────────────────────┤
//! │              renderer / geometry / mask             │
//! │      tiny-skia content + 1-bit visibility mask      │
//! ├─────────────────────────────────────────────────────┤
//! │                    font                             │
//! │        cosmic-text shaping and rasterization        │
//! ├─────────────────────────────────────────────────────┤
//! │                    platform/                        │
//! │        x11 (shape + shm), headless                  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod colour;
pub mod engine;
pub mod error;
pub mod font;
pub mod geometry;
pub mod line;
pub mod logging;
pub mod mask;
pub mod platform;
mod reactor;
pub mod renderer;


pub use colour::Rgb;
pub use engine::Osd;
pub use error::{OsdError, Result};
pub use font::{CosmicShaper, FontDescriptor, FontMetrics, TextShaper};
pub use line::{Content, Line, LineKind};
pub use osd_types::{Alignment, OsdConfig, Position};
pub use platform::{EventSource, Surface, SurfaceEvent};
