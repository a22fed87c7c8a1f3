//! A display server without a display.
//!
//! Monitors, the pointer and the hosted login UI are plain values, and
//! backdrops are painted into [`RgbaImage`]s. Used to preview a
//! configuration against a made-up topology.

use std::{collections::BTreeMap, sync::Arc};

use image::{Rgba, RgbaImage, imageops};
use log::debug;

use crate::{
    display::{
        BackdropRequest, BackdropWindow, DisplayServer, Geometry, HostedWidget, MonitorInfo,
        Painter, ScreenId,
    },
    error::{Error, Result},
};

#[derive(Debug, Clone)]
pub struct OffscreenServer {
    screen: ScreenId,
    monitors: Vec<MonitorInfo>,
    primary: Option<usize>,
    pointer: Option<(i32, i32)>,
    refuse_backdrops: bool,
    backdrops_created: usize,
}

impl OffscreenServer {
    pub fn new(monitors: Vec<MonitorInfo>) -> Self {
        Self {
            screen: ScreenId(0),
            primary: (!monitors.is_empty()).then_some(0),
            monitors,
            pointer: None,
            refuse_backdrops: false,
            backdrops_created: 0,
        }
    }

    pub fn with_screen(mut self, screen: ScreenId) -> Self {
        self.screen = screen;
        self
    }

    pub fn with_primary(mut self, primary: Option<usize>) -> Self {
        self.primary = primary;
        self
    }

    pub fn with_pointer(mut self, x: i32, y: i32) -> Self {
        self.pointer = Some((x, y));
        self
    }

    /// Replaces the topology, as a hotplug would.
    pub fn set_monitors(&mut self, monitors: Vec<MonitorInfo>) {
        self.primary = self.primary.filter(|primary| *primary < monitors.len());
        self.monitors = monitors;
    }

    pub fn set_pointer(&mut self, pointer: Option<(i32, i32)>) {
        self.pointer = pointer;
    }

    /// Makes every following backdrop creation fail.
    pub fn set_refuse_backdrops(&mut self, refuse: bool) {
        self.refuse_backdrops = refuse;
    }

    pub fn backdrops_created(&self) -> usize {
        self.backdrops_created
    }
}

impl DisplayServer for OffscreenServer {
    type Window = OffscreenWindow;

    fn screen(&self) -> ScreenId {
        self.screen
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        self.monitors.clone()
    }

    fn primary_monitor(&self) -> Option<usize> {
        self.primary
    }

    fn pointer_position(&self) -> Option<(i32, i32)> {
        self.pointer
    }

    fn create_backdrop(&mut self, request: &BackdropRequest) -> Result<OffscreenWindow> {
        if self.refuse_backdrops {
            return Err(Error::Monitor(format!(
                "Cannot create backdrop {} for monitor #{}",
                request.name, request.index
            )));
        }

        self.backdrops_created += 1;
        Ok(OffscreenWindow {
            name: request.name.clone(),
            geometry: request.geometry,
            accel_groups: Vec::new(),
            hosting: false,
            draws_queued: 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffscreenWindow {
    name: String,
    geometry: Geometry,
    accel_groups: Vec<String>,
    hosting: bool,
    draws_queued: usize,
}

impl OffscreenWindow {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn accel_groups(&self) -> &[String] {
        &self.accel_groups
    }

    pub fn is_hosting(&self) -> bool {
        self.hosting
    }

    pub fn draws_queued(&self) -> usize {
        self.draws_queued
    }
}

impl BackdropWindow for OffscreenWindow {
    type Child = OffscreenWidget;
    type AccelGroup = String;

    fn attach(&mut self, child: &mut OffscreenWidget) {
        debug!("Attaching login UI to {}", self.name);
        self.hosting = true;
        child.parent = Some(self.name.clone());
    }

    fn detach(&mut self, child: &mut OffscreenWidget) {
        self.hosting = false;
        child.parent = None;
        // Reparenting drops keyboard focus.
        child.focus = None;
    }

    fn add_accel_group(&mut self, group: &String) {
        self.accel_groups.push(group.clone());
    }

    fn queue_draw(&mut self) {
        self.draws_queued += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    text: String,
    caret: usize,
}

/// Stand-in for the login UI: named buttons and text entries, one of which
/// may hold the keyboard focus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffscreenWidget {
    parent: Option<String>,
    entries: BTreeMap<String, Option<Entry>>,
    focus: Option<String>,
}

impl OffscreenWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: &str, text: &str) -> Self {
        self.entries.insert(
            name.to_owned(),
            Some(Entry {
                text: text.to_owned(),
                caret: text.chars().count(),
            }),
        );
        self
    }

    pub fn with_button(mut self, name: &str) -> Self {
        self.entries.insert(name.to_owned(), None);
        self
    }

    /// Name of the backdrop window currently hosting the widget.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    pub fn caret(&self, name: &str) -> Option<usize> {
        self.entries
            .get(name)
            .and_then(|entry| entry.as_ref())
            .map(|entry| entry.caret)
    }

    /// Focuses `name` as a click would, placing the caret at `caret` when
    /// it is an entry.
    pub fn click(&mut self, name: &str, caret: usize) {
        if let Some(entry) = self.entries.get_mut(name) {
            if let Some(entry) = entry {
                entry.caret = caret.min(entry.text.chars().count());
            }
            self.focus = Some(name.to_owned());
        }
    }
}

impl HostedWidget for OffscreenWidget {
    type Focus = String;

    fn focused(&self) -> Option<String> {
        self.focus.clone()
    }

    fn caret_position(&self, focus: &String) -> Option<usize> {
        self.caret(focus)
    }

    fn grab_focus(&mut self, focus: &String) {
        if let Some(entry) = self.entries.get_mut(focus) {
            // Focusing an entry selects its text and moves the caret to the end.
            if let Some(entry) = entry {
                entry.caret = entry.text.chars().count();
            }
            self.focus = Some(focus.clone());
        }
    }

    fn set_caret_position(&mut self, focus: &String, position: usize) {
        if let Some(Some(entry)) = self.entries.get_mut(focus) {
            entry.caret = position.min(entry.text.chars().count());
        }
    }
}

impl Painter for RgbaImage {
    fn fill_rect(&mut self, color: Rgba<u8>, width: u32, height: u32) {
        let tile = RgbaImage::from_pixel(
            width.min(self.width()),
            height.min(self.height()),
            color,
        );
        imageops::replace(self, &tile, 0, 0);
    }

    fn blit(&mut self, image: &Arc<RgbaImage>, x: i32, y: i32) {
        imageops::replace(self, &**image, i64::from(x), i64::from(y));
    }
}
