use std::sync::Arc;

use image::{Rgba, RgbaImage};
use log::debug;

use crate::{
    background::{BackgroundSpec, FALLBACK_COLOR},
    cache::ImageCache,
    display::{BackdropRequest, BackdropWindow, DisplayServer, Geometry, MonitorInfo, Painter},
    error::Result,
};

/// What a backdrop shows once its spec has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    Color(Rgba<u8>),
    /// Already fitted to the monitor by the [`ImageCache`].
    Image(Arc<RgbaImage>),
}

/// One physical monitor and the backdrop window covering it.
#[derive(Debug)]
pub struct DisplaySurface<W> {
    index: usize,
    name: Option<String>,
    geometry: Geometry,
    primary: bool,
    spec: BackgroundSpec,
    background: Option<Background>,
    window: Option<W>,
}

impl<W: BackdropWindow> DisplaySurface<W> {
    pub fn create<S>(
        index: usize,
        info: &MonitorInfo,
        spec: BackgroundSpec,
        primary: bool,
        cache: &mut ImageCache,
        server: &mut S,
    ) -> Result<Self>
    where
        S: DisplayServer<Window = W>,
    {
        let mut surface = Self {
            index,
            name: info.name.clone().filter(|name| !name.is_empty()),
            geometry: info.geometry,
            primary,
            spec: BackgroundSpec::Skip,
            background: None,
            window: None,
        };

        debug!(
            "Monitor: {} #{} ({}x{} at {}x{}){}",
            surface.printable_name(),
            index,
            surface.geometry.width,
            surface.geometry.height,
            surface.geometry.x,
            surface.geometry.y,
            if primary { " primary" } else { "" }
        );

        surface.resolve(spec, cache, server)?;
        Ok(surface)
    }

    /// Replaces the background of an existing surface, keeping its identity
    /// and geometry.
    pub fn force_resolve<S>(
        &mut self,
        spec: BackgroundSpec,
        cache: &mut ImageCache,
        server: &mut S,
    ) -> Result<()>
    where
        S: DisplayServer<Window = W>,
    {
        debug!(
            "Explicitly set background {} for monitor {} #{}",
            spec,
            self.printable_name(),
            self.index
        );

        self.resolve(spec, cache, server)
    }

    fn resolve<S>(&mut self, spec: BackgroundSpec, cache: &mut ImageCache, server: &mut S) -> Result<()>
    where
        S: DisplayServer<Window = W>,
    {
        let background = match &spec {
            BackgroundSpec::Skip => None,
            BackgroundSpec::Color(color) => Some(Background::Color(*color)),
            BackgroundSpec::Image { path, mode } => Some(Background::Image(cache.get(
                path,
                *mode,
                self.geometry.width,
                self.geometry.height,
            )?)),
        };

        if background.is_none() {
            self.window = None;
        } else if let Some(window) = self.window.as_mut() {
            window.queue_draw();
        } else {
            let request = BackdropRequest {
                index: self.index,
                name: self.window_name(),
                geometry: self.geometry,
            };
            self.window = Some(server.create_backdrop(&request)?);
        }

        self.spec = spec;
        self.background = background;
        Ok(())
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn printable_name(&self) -> &str {
        self.name().unwrap_or("<unknown>")
    }

    pub fn window_name(&self) -> String {
        match self.name() {
            Some(name) => format!("monitor-{name}"),
            None => format!("monitor-{}", self.index),
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Whether the surface renders something and can host the login UI.
    pub fn is_enabled(&self) -> bool {
        self.background.is_some() && self.window.is_some()
    }

    pub fn spec(&self) -> &BackgroundSpec {
        &self.spec
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn window(&self) -> Option<&W> {
        self.window.as_ref()
    }

    pub fn window_mut(&mut self) -> Option<&mut W> {
        self.window.as_mut()
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.geometry.contains(x, y)
    }

    pub fn add_accel_group(&mut self, group: &W::AccelGroup) {
        if let Some(window) = self.window.as_mut() {
            window.add_accel_group(group);
        }
    }

    /// Repaints the backdrop in surface-local coordinates.
    pub fn paint<P: Painter>(&self, painter: &mut P) {
        match &self.background {
            Some(Background::Color(color)) => {
                painter.fill_rect(*color, self.geometry.width, self.geometry.height)
            }
            Some(Background::Image(image)) => {
                // Source images may not cover the whole display.
                if image.width() < self.geometry.width || image.height() < self.geometry.height {
                    painter.fill_rect(FALLBACK_COLOR, self.geometry.width, self.geometry.height);
                }
                painter.blit(image, 0, 0);
            }
            None => {}
        }
    }
}
