//! Boundary with the display server and the hosted login UI.
//!
//! The backdrop logic never talks to a compositor directly: everything it
//! needs from the outside world goes through the traits below.

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::error::Result;

/// Identity of the screen a [`DisplayServer`] drives. Topology
/// notifications carry one so the receiver can reject foreign ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenId(pub u32);

/// Position and size of a monitor in the shared virtual screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let (left, top) = (i64::from(self.x), i64::from(self.y));

        x >= left
            && x < left + i64::from(self.width)
            && y >= top
            && y < top + i64::from(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    /// Connector name, e.g. `HDMI-1`. Some servers leave it empty.
    pub name: Option<String>,
    pub geometry: Geometry,
}

/// What a backdrop window is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackdropRequest {
    pub index: usize,
    pub name: String,
    pub geometry: Geometry,
}

pub trait DisplayServer {
    type Window: BackdropWindow;

    fn screen(&self) -> ScreenId;

    /// Monitors in index order.
    fn monitors(&self) -> Vec<MonitorInfo>;

    fn primary_monitor(&self) -> Option<usize>;

    /// Pointer position in virtual screen coordinates, if the server can
    /// report it.
    fn pointer_position(&self) -> Option<(i32, i32)>;

    /// Create, position and show a full-screen backdrop window below every
    /// other window.
    fn create_backdrop(&mut self, request: &BackdropRequest) -> Result<Self::Window>;
}

pub trait BackdropWindow {
    type Child: HostedWidget;
    type AccelGroup: Clone + PartialEq;

    fn attach(&mut self, child: &mut Self::Child);

    fn detach(&mut self, child: &mut Self::Child);

    fn add_accel_group(&mut self, group: &Self::AccelGroup);

    /// Ask the server to repaint the window.
    fn queue_draw(&mut self) {}
}

/// The login UI that moves between backdrops.
pub trait HostedWidget {
    /// Handle to a widget inside the hosted subtree.
    type Focus: Clone;

    fn focused(&self) -> Option<Self::Focus>;

    /// Caret offset of `focus` when it is an editable widget.
    fn caret_position(&self, focus: &Self::Focus) -> Option<usize>;

    fn grab_focus(&mut self, focus: &Self::Focus);

    fn set_caret_position(&mut self, focus: &Self::Focus, position: usize);
}

/// Drawing primitives used when a backdrop is repainted. Coordinates are
/// local to the surface.
pub trait Painter {
    fn fill_rect(&mut self, color: Rgba<u8>, width: u32, height: u32);

    fn blit(&mut self, image: &Arc<RgbaImage>, x: i32, y: i32);
}
