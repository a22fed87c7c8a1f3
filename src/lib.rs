//! Login backdrops spanning every monitor, with the login UI following the
//! pointer from one monitor to the next.

pub mod background;
pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod manager;
pub mod offscreen;
pub mod surface;

pub use background::{BackgroundSpec, ScalingMode};
pub use cache::ImageCache;
pub use config::{Config, MonitorConfigs};
pub use error::{Error, Result};
pub use manager::SurfaceManager;
pub use surface::{Background, DisplaySurface};
