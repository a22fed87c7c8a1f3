use std::mem;

use log::{debug, info, warn};

use crate::{
    background::{BackgroundSpec, FALLBACK_COLOR},
    cache::ImageCache,
    config::MonitorConfigs,
    display::{BackdropWindow, DisplayServer, HostedWidget, MonitorInfo, Painter, ScreenId},
    error::{Error, Result},
    surface::DisplaySurface,
};

type Window<S> = <S as DisplayServer>::Window;
type Child<S> = <Window<S> as BackdropWindow>::Child;
type AccelGroup<S> = <Window<S> as BackdropWindow>::AccelGroup;
type Focus<S> = <Child<S> as HostedWidget>::Focus;

struct SavedFocus<F> {
    widget: F,
    caret: Option<usize>,
}

/// Keeps a backdrop on every monitor and the login UI on exactly one of
/// them.
pub struct SurfaceManager<S: DisplayServer> {
    server: S,
    configs: MonitorConfigs,
    child: Option<Child<S>>,
    accel_groups: Vec<AccelGroup<S>>,
    cache: ImageCache,
    surfaces: Vec<DisplaySurface<Window<S>>>,
    /// Indices of enabled surfaces, ascending.
    enabled: Vec<usize>,
    /// Index of the surface hosting `child`.
    host: Option<usize>,
    generation: u64,
}

impl<S: DisplayServer> SurfaceManager<S> {
    /// Creates a manager without any surfaces. Call [`Self::rebuild`] to
    /// populate it.
    pub fn new(server: S, configs: MonitorConfigs, child: Child<S>) -> Self {
        Self {
            server,
            configs,
            child: Some(child),
            accel_groups: Vec::new(),
            cache: ImageCache::new(),
            surfaces: Vec::new(),
            enabled: Vec::new(),
            host: None,
            generation: 0,
        }
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }

    pub fn child(&self) -> Option<&Child<S>> {
        self.child.as_ref()
    }

    pub fn child_mut(&mut self) -> Option<&mut Child<S>> {
        self.child.as_mut()
    }

    pub fn surfaces(&self) -> &[DisplaySurface<Window<S>>] {
        &self.surfaces
    }

    pub fn enabled_surfaces(&self) -> impl Iterator<Item = &DisplaySurface<Window<S>>> {
        self.enabled.iter().map(|index| &self.surfaces[*index])
    }

    /// The surface currently hosting the login UI.
    pub fn active(&self) -> Option<&DisplaySurface<Window<S>>> {
        self.host.map(|index| &self.surfaces[index])
    }

    /// Number of completed rebuilds.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Recreates every surface from the current topology and moves the login
    /// UI to the monitor under the pointer.
    ///
    /// On error the previous generation is left untouched.
    pub fn rebuild(&mut self) -> Result<()> {
        info!(
            "Setting monitor backgrounds for screen {:?}",
            self.server.screen()
        );

        // Scaled images are sized for the old topology.
        self.cache = ImageCache::new();

        let monitors = self.server.monitors();
        debug!("Monitors found: {}", monitors.len());
        if monitors.is_empty() {
            return Err(Error::Monitor(format!(
                "Screen {:?} reports no monitors",
                self.server.screen()
            )));
        }

        let primary = self.server.primary_monitor();
        let mut surfaces = Vec::with_capacity(monitors.len());
        for (index, info) in monitors.iter().enumerate() {
            surfaces.push(self.create_surface(index, info, primary == Some(index))?);
        }

        if !surfaces.iter().any(|surface| surface.is_enabled()) {
            if let Some(last) = surfaces.last_mut() {
                debug!(
                    "Monitor {} #{} cannot be skipped. Using default configuration for it",
                    last.printable_name(),
                    last.index()
                );
                self.force_enable(last)?;
            }
        }

        let enabled: Vec<usize> = surfaces
            .iter()
            .filter(|surface| {
                if !surface.is_enabled() {
                    debug!(
                        "Skipping monitor {} #{}",
                        surface.printable_name(),
                        surface.index()
                    );
                }
                surface.is_enabled()
            })
            .map(|surface| surface.index())
            .collect();

        for index in &enabled {
            let surface = &mut surfaces[*index];
            debug!(
                "Monitor {} #{} is enabled",
                surface.printable_name(),
                surface.index()
            );
            for group in &self.accel_groups {
                surface.add_accel_group(group);
            }
        }

        let winner = Self::hit_test(&surfaces, &enabled, self.server.pointer_position())
            .ok_or_else(|| Error::Monitor("No enabled monitor after rebuild".to_owned()))?;

        // The login UI leaves the old generation before it is dropped.
        let focus = self.save_focus();
        self.detach_child();

        let retired = mem::replace(&mut self.surfaces, surfaces);
        self.enabled = enabled;
        self.generation += 1;
        drop(retired);

        self.attach_child(winner, focus);

        info!(
            "Monitor generation {}: {} monitors, {} enabled",
            self.generation,
            self.surfaces.len(),
            self.enabled.len()
        );
        Ok(())
    }

    /// Moves the login UI to surface `index`, keeping the keyboard focus and
    /// caret position of the focused widget.
    pub fn set_active(&mut self, index: usize) -> Result<()> {
        let surface = self.surfaces.get(index).ok_or_else(|| {
            Error::Monitor(format!(
                "No monitor number #{index} exists (valid numbers range from 0 to {})",
                self.surfaces.len()
            ))
        })?;

        if !surface.is_enabled() {
            return Err(Error::Monitor(format!(
                "Cannot set monitor {} #{} as active. No background present",
                surface.printable_name(),
                index
            )));
        }

        if self.host == Some(index) {
            return Ok(());
        }

        debug!(
            "Setting monitor {} #{} as active",
            surface.printable_name(),
            index
        );

        let focus = self.save_focus();
        self.detach_child();
        self.attach_child(index, focus);
        Ok(())
    }

    /// Pointer entered the backdrop of surface `index`.
    pub fn pointer_entered(&mut self, index: usize) -> Result<()> {
        self.set_active(index)
    }

    /// Activates the enabled surface under `(x, y)`, if any.
    pub fn pointer_moved(&mut self, x: i32, y: i32) -> Result<()> {
        match self
            .enabled
            .iter()
            .copied()
            .find(|index| self.surfaces[*index].contains_point(x, y))
        {
            Some(index) => self.set_active(index),
            None => Ok(()),
        }
    }

    /// Registers an accelerator group on every enabled backdrop, now and
    /// after every rebuild.
    pub fn add_accel_group(&mut self, group: AccelGroup<S>) {
        if self.accel_groups.contains(&group) {
            return;
        }

        for index in &self.enabled {
            self.surfaces[*index].add_accel_group(&group);
        }
        self.accel_groups.push(group);
    }

    /// Handles a topology change reported for `screen`.
    pub fn monitors_changed(&mut self, screen: ScreenId) -> Result<()> {
        let bound = self.server.screen();
        if screen != bound {
            return Err(Error::Binding {
                bound,
                received: screen,
            });
        }

        debug!("Monitors changed for screen {screen:?}");
        self.rebuild()
    }

    /// The login UI was destroyed by its owner.
    pub fn child_destroyed(&mut self) {
        self.child = None;
        self.host = None;
    }

    pub fn paint<P: Painter>(&self, index: usize, painter: &mut P) -> Result<()> {
        let surface = self
            .surfaces
            .get(index)
            .ok_or_else(|| Error::Monitor(format!("No monitor number #{index} exists")))?;

        surface.paint(painter);
        Ok(())
    }

    /// First enabled surface containing the pointer, else the first enabled
    /// surface.
    fn hit_test(
        surfaces: &[DisplaySurface<Window<S>>],
        enabled: &[usize],
        pointer: Option<(i32, i32)>,
    ) -> Option<usize> {
        let under_pointer = pointer.and_then(|(x, y)| {
            enabled
                .iter()
                .copied()
                .find(|index| surfaces[*index].contains_point(x, y))
        });

        match under_pointer {
            Some(index) => {
                debug!(
                    "Monitor {} #{} contains the cursor. Setting it as the active monitor.",
                    surfaces[index].printable_name(),
                    index
                );
                Some(index)
            }
            None => {
                let first = enabled.first().copied()?;
                debug!(
                    "Cursor is not in area of enabled monitors. Using monitor {} #{}",
                    surfaces[first].printable_name(),
                    first
                );
                Some(first)
            }
        }
    }

    /// Builds the surface for one monitor. A background that fails to load
    /// falls back to the default, then to a flat color.
    fn create_surface(
        &mut self,
        index: usize,
        info: &MonitorInfo,
        primary: bool,
    ) -> Result<DisplaySurface<Window<S>>> {
        let spec = self.configs.resolve(index, info.name.as_deref()).clone();

        let mut candidates = vec![spec];
        for fallback in [
            self.configs.default_spec().clone(),
            BackgroundSpec::Color(FALLBACK_COLOR),
        ] {
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }

        let mut last_error = None;
        for spec in candidates {
            match DisplaySurface::create(
                index,
                info,
                spec,
                primary,
                &mut self.cache,
                &mut self.server,
            ) {
                Ok(surface) => return Ok(surface),
                Err(e) if e.is_per_display() => {
                    warn!("Background of monitor #{index} unavailable: {e}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Monitor(format!("No background for monitor #{index}"))))
    }

    /// The default background if it renders anything, otherwise a flat
    /// color.
    fn force_enable(&mut self, surface: &mut DisplaySurface<Window<S>>) -> Result<()> {
        let default = self.configs.default_spec().clone();

        if !default.is_skip() {
            match surface.force_resolve(default, &mut self.cache, &mut self.server) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_per_display() => {
                    warn!(
                        "Default background unavailable for monitor #{}: {e}",
                        surface.index()
                    );
                }
                Err(e) => return Err(e),
            }
        }

        surface.force_resolve(
            BackgroundSpec::Color(FALLBACK_COLOR),
            &mut self.cache,
            &mut self.server,
        )
    }

    fn save_focus(&self) -> Option<SavedFocus<Focus<S>>> {
        let child = self.child.as_ref()?;
        self.host?;

        let widget = child.focused()?;
        let caret = child.caret_position(&widget);
        Some(SavedFocus { widget, caret })
    }

    fn detach_child(&mut self) {
        let Some(host) = self.host.take() else {
            return;
        };

        if let (Some(child), Some(window)) = (
            self.child.as_mut(),
            self.surfaces.get_mut(host).and_then(|s| s.window_mut()),
        ) {
            window.detach(child);
        }
    }

    fn attach_child(&mut self, index: usize, focus: Option<SavedFocus<Focus<S>>>) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        let Some(window) = self.surfaces[index].window_mut() else {
            return;
        };

        window.attach(child);
        self.host = Some(index);

        if let Some(SavedFocus { widget, caret }) = focus {
            child.grab_focus(&widget);
            if let Some(caret) = caret {
                child.set_caret_position(&widget, caret);
            }
        }
    }
}
