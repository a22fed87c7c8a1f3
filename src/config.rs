use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::background::BackgroundSpec;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/lightdm/greetshell.toml";
pub const DEFAULT_SECTION: &str = "greeter";
pub const MONITOR_SECTION_PREFIX: &str = "monitor:";
const BACKGROUND_KEY: &str = "background";

/// Key/value pairs of one configuration section.
pub type Section = BTreeMap<String, String>;

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Every other top-level entry. Only tables are sections.
    #[serde(flatten)]
    sections: BTreeMap<String, toml::Value>,
    /// Directory relative image paths are looked up in.
    #[serde(skip, default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_log_level() -> String {
    "warn".to_owned()
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sections: BTreeMap::new(),
            base_dir: default_base_dir(),
        }
    }
}

impl Config {
    pub fn parse(content: &str, base_dir: &Path) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.base_dir = base_dir.to_path_buf();

        for (key, _) in config.sections.iter().filter(|(_, value)| !value.is_table()) {
            warn!("Ignoring unknown config key {key}");
        }

        Ok(config)
    }

    /// Values of section `name`, stringified.
    pub fn section(&self, name: &str) -> Option<Section> {
        self.sections.get(name).and_then(toml::Value::as_table).map(|table| {
            table
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        toml::Value::String(value) => value.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect()
        })
    }

    /// `monitor:<name-or-index>` sections, keyed by what follows the prefix.
    pub fn monitor_sections(&self) -> impl Iterator<Item = (String, Section)> + '_ {
        self.sections.keys().filter_map(|key| {
            let monitor = key.strip_prefix(MONITOR_SECTION_PREFIX)?.trim();
            self.section(key)
                .map(|section| (monitor.to_owned(), section))
        })
    }
}

/// Reads the configuration at `path`. A missing file is not an error: the
/// defaults render a black backdrop on every monitor.
pub fn read_config(path: &Path) -> anyhow::Result<Config> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let path = Path::new(&expanded);

    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    info!("Reading config file {}", path.display());
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    Config::parse(&content, base_dir)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Background resolution table: a default plus per-monitor overrides keyed
/// by connector name or monitor index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorConfigs {
    default: BackgroundSpec,
    overrides: HashMap<String, BackgroundSpec>,
}

impl MonitorConfigs {
    pub fn new(default: BackgroundSpec) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, monitor: impl Into<String>, spec: BackgroundSpec) -> Self {
        self.overrides.insert(monitor.into(), spec);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let default = background_from_section(
            config.section(DEFAULT_SECTION).as_ref(),
            &config.base_dir,
            &BackgroundSpec::default(),
        );
        debug!("Default background: {default}");

        let overrides = config
            .monitor_sections()
            .map(|(monitor, section)| {
                let spec = background_from_section(Some(&section), &config.base_dir, &default);
                debug!("Background for monitor {monitor}: {spec}");
                (monitor, spec)
            })
            .collect();

        Self { default, overrides }
    }

    pub fn default_spec(&self) -> &BackgroundSpec {
        &self.default
    }

    /// Name first (when there is one), then index, then the default.
    pub fn resolve(&self, index: usize, name: Option<&str>) -> &BackgroundSpec {
        name.filter(|name| !name.is_empty())
            .and_then(|name| self.overrides.get(name))
            .or_else(|| self.overrides.get(&index.to_string()))
            .unwrap_or_else(|| {
                debug!(
                    "No configuration set for monitor {} #{index}. Using default",
                    name.unwrap_or("<unknown>")
                );
                &self.default
            })
    }
}

/// Resolves the `background` key of `section`, falling back to `fallback`
/// when it is absent or invalid.
fn background_from_section(
    section: Option<&Section>,
    base_dir: &Path,
    fallback: &BackgroundSpec,
) -> BackgroundSpec {
    let Some(descriptor) = section
        .and_then(|section| section.get(BACKGROUND_KEY))
        .filter(|descriptor| !descriptor.trim().is_empty())
    else {
        return fallback.clone();
    };

    match BackgroundSpec::parse(descriptor, base_dir) {
        Ok(spec) => spec,
        Err(e) => {
            warn!(
                "Invalid monitor config option background: '{descriptor}' ({e}). Using {fallback} instead"
            );
            fallback.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{FALLBACK_COLOR, ScalingMode};
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn defaults_without_a_file() {
        let dir = tempfile::tempdir().unwrap();

        let config = read_config(&dir.path().join("greetshell.toml")).unwrap();
        let configs = MonitorConfigs::from_config(&config);

        assert_eq!(config.log_level, "warn");
        assert_eq!(configs.default_spec(), &BackgroundSpec::Color(FALLBACK_COLOR));
    }

    #[test]
    fn sections_are_stringified() {
        let config = Config::parse(
            r##"
                log_level = "debug"

                [greeter]
                background = "#ff0000"
                xft-dpi = 96
                show-clock = true
            "##,
            Path::new("."),
        )
        .unwrap();

        let greeter = config.section(DEFAULT_SECTION).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(greeter["background"], "#ff0000");
        assert_eq!(greeter["xft-dpi"], "96");
        assert_eq!(greeter["show-clock"], "true");
    }

    #[test]
    fn reads_default_and_monitor_sections() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("login.png");
        image::RgbaImage::new(2, 2).save(&image).unwrap();
        let path = dir.path().join("greetshell.toml");
        fs::write(
            &path,
            r##"
                [greeter]
                background = "#stretched:login.png"

                ["monitor:HDMI-1"]
                background = "#skip"

                ["monitor: 1 "]
                background = "#ff0000"

                ["monitor:DP-2"]
                background = "#zoomed:missing.png"

                [unrelated]
                background = "#00ff00"
            "##,
        )
        .unwrap();

        let config = read_config(&path).unwrap();
        let configs = MonitorConfigs::from_config(&config);
        let default = BackgroundSpec::Image {
            path: image,
            mode: ScalingMode::Stretched,
        };

        assert_eq!(configs.default_spec(), &default);
        assert_eq!(configs.resolve(0, Some("HDMI-1")), &BackgroundSpec::Skip);
        assert_eq!(configs.resolve(1, None), &BackgroundSpec::Color(RED));
        assert_eq!(configs.resolve(2, Some("DP-2")), &default);
        assert_eq!(configs.resolve(3, Some("DP-3")), &default);
        assert_eq!(configs.overrides.len(), 3);
    }

    #[test]
    fn name_beats_index() {
        let configs = MonitorConfigs::new(BackgroundSpec::default())
            .with_override("0", BackgroundSpec::Color(RED))
            .with_override("eDP-1", BackgroundSpec::Skip);

        assert_eq!(configs.resolve(0, Some("eDP-1")), &BackgroundSpec::Skip);
        assert_eq!(configs.resolve(0, Some("DP-1")), &BackgroundSpec::Color(RED));
        assert_eq!(configs.resolve(0, Some("")), &BackgroundSpec::Color(RED));
        assert_eq!(configs.resolve(1, Some("")), &BackgroundSpec::default());
    }

    #[test]
    fn invalid_default_falls_back_to_black() {
        let config = Config::parse(
            r##"
                [greeter]
                background = "#not-a-color"
            "##,
            Path::new("/nonexistent"),
        )
        .unwrap();

        assert_eq!(
            MonitorConfigs::from_config(&config).default_spec(),
            &BackgroundSpec::Color(FALLBACK_COLOR)
        );
    }

    #[test]
    fn override_without_background_inherits_the_default() {
        let config = Config::parse(
            r##"
                [greeter]
                background = "#ff0000"

                ["monitor:VGA-1"]
                other = "value"
            "##,
            Path::new("."),
        )
        .unwrap();

        assert_eq!(
            MonitorConfigs::from_config(&config).resolve(0, Some("VGA-1")),
            &BackgroundSpec::Color(RED)
        );
    }

    #[test]
    fn stray_top_level_keys_are_ignored() {
        let config = Config::parse(
            r##"
                log-level = "debug"
                "monitor:0" = "#00ff00"

                [greeter]
                background = "#ff0000"
            "##,
            Path::new("."),
        )
        .unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.section("log-level"), None);
        assert_eq!(config.monitor_sections().count(), 0);
        assert_eq!(
            MonitorConfigs::from_config(&config).resolve(0, None),
            &BackgroundSpec::Color(RED)
        );
    }

    #[test]
    fn malformed_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greetshell.toml");
        fs::write(&path, "[greeter\nbackground = ").unwrap();

        assert!(read_config(&path).is_err());
    }
}
