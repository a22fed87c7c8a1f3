use std::{
    fmt,
    path::{Path, PathBuf},
};

use image::Rgba;

use crate::error::{Error, Result};

pub const SKIP: &str = "#skip";

/// Rendered whenever a display must show something and nothing better is
/// configured.
pub const FALLBACK_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScalingMode {
    /// Image pixels as they are.
    Source,
    /// Scale each axis independently to fill the display.
    Stretched,
    /// Scale uniformly to cover the display, cropping the overflow.
    #[default]
    Zoomed,
}

impl ScalingMode {
    pub const ALL: [ScalingMode; 3] = [
        ScalingMode::Source,
        ScalingMode::Stretched,
        ScalingMode::Zoomed,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ScalingMode::Source => "#source",
            ScalingMode::Stretched => "#stretched",
            ScalingMode::Zoomed => "#zoomed",
        }
    }

    /// Splits `#mode:path` into its mode and path.
    fn strip_prefix(descriptor: &str) -> Option<(ScalingMode, &str)> {
        Self::ALL.into_iter().find_map(|mode| {
            descriptor
                .strip_prefix(mode.token())
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|path| (mode, path))
        })
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Validated background configuration of a single display.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundSpec {
    /// Nothing is rendered and the display cannot host the login UI.
    Skip,
    Color(Rgba<u8>),
    Image { path: PathBuf, mode: ScalingMode },
}

impl Default for BackgroundSpec {
    fn default() -> Self {
        BackgroundSpec::Color(FALLBACK_COLOR)
    }
}

impl BackgroundSpec {
    /// Parses a background descriptor.
    ///
    /// Accepted forms, tried in order: `#skip`, `#<mode>:<path>`, a color
    /// (see [`parse_color`]) and finally a bare image path scaled with
    /// [`ScalingMode::Zoomed`]. Image paths must exist;
    /// relative ones are looked up in `base_dir`.
    pub fn parse(descriptor: &str, base_dir: &Path) -> Result<Self> {
        let descriptor = descriptor.trim();

        if descriptor == SKIP {
            return Ok(BackgroundSpec::Skip);
        }

        if let Some((mode, raw_path)) = ScalingMode::strip_prefix(descriptor) {
            let path = resolve_path(raw_path, base_dir);
            if !path.exists() {
                return Err(Error::InvalidImagePath(path));
            }

            return Ok(BackgroundSpec::Image { path, mode });
        }

        if let Some(color) = parse_color(descriptor) {
            return Ok(BackgroundSpec::Color(color));
        }

        let path = resolve_path(descriptor, base_dir);
        if !descriptor.is_empty() && path.exists() {
            Ok(BackgroundSpec::Image {
                path,
                mode: ScalingMode::default(),
            })
        } else {
            Err(Error::InvalidBackgroundSpec(descriptor.to_owned()))
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, BackgroundSpec::Skip)
    }
}

impl fmt::Display for BackgroundSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundSpec::Skip => f.write_str(SKIP),
            BackgroundSpec::Color(Rgba([r, g, b, a])) => {
                write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
            }
            BackgroundSpec::Image { path, mode } => write!(f, "{mode}:{}", path.display()),
        }
    }
}

/// Parses a CSS color: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, a named
/// color, or the `rgb()`/`rgba()`/`hsl()` functional forms.
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    // Bare hex digits are a file name here, not a color.
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    csscolorparser::parse(value)
        .ok()
        .map(|color| Rgba(color.to_rgba8()))
}

fn resolve_path(raw: &str, base_dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(raw.trim());

    base_dir.join(&*expanded)
}
