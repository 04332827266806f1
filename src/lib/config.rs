//! Configuration loading.
//!
//! Settings come from a TOML file (`jobdescrc.toml` by convention). Every
//! key is optional; anything missing or malformed falls back to the
//! built-in default, so a broken file never stops an export.
//!
//! ```toml
//! [refine]
//! api_key_env = "API_KEY"       # environment variable holding the credential
//! model = "gemini-2.0-flash"
//! endpoint = "https://generativelanguage.googleapis.com/v1beta"
//! temperature = 0.3
//! timeout_secs = 30
//!
//! [export]
//! scale = 2.0                   # rasterization upscale factor, at least 2
//! output_dir = "."
//!
//! [logos]
//! organization = "assets/org.png"                   # path or http(s) URL
//! government = "https://example.com/gov-logo.png"
//!
//! [fonts]
//! family = "Tahoma"
//! paths = ["./fonts"]
//! ```

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "jobdescrc.toml";

/// Lowest rasterization scale accepted. Below this the export looks blurry.
pub const MIN_SCALE: f32 = 2.0;

/// Highest rasterization scale accepted. An A4 page at this scale is about
/// 100 MB of RGB pixels.
pub const MAX_SCALE: f32 = 6.0;

/// Where the TOML configuration should be loaded from.
#[derive(Debug, Clone)]
pub enum ConfigSource<'a> {
    /// Use default built-in settings
    Default,
    /// Load settings from a file path
    File(&'a str),
    /// Use an embedded TOML string
    Embedded(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefineSettings {
    pub api_key_env: String,
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for RefineSettings {
    fn default() -> Self {
        RefineSettings {
            api_key_env: "API_KEY".to_string(),
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.3,
            timeout_secs: 30,
        }
    }
}

impl RefineSettings {
    /// Reads the credential from the configured variable, then `GEMINI_API_KEY`.
    /// Blank values count as absent.
    pub fn api_key(&self) -> Option<String> {
        [self.api_key_env.as_str(), "GEMINI_API_KEY"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub scale: f32,
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            scale: MIN_SCALE,
            output_dir: None,
        }
    }
}

/// Overrides for the built-in header logos. Values are paths or http(s) URLs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogoSettings {
    pub organization: Option<String>,
    pub government: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontSettings {
    pub family: Option<String>,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub refine: RefineSettings,
    pub export: ExportSettings,
    pub logos: LogoSettings,
    pub fonts: FontSettings,
}

fn get_str(table: Option<&Value>, key: &str) -> Option<String> {
    table
        .and_then(|t| t.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Accepts both `2` and `2.0`.
fn get_number(table: Option<&Value>, key: &str) -> Option<f64> {
    let value = table.and_then(|t| t.get(key))?;
    value.as_float().or_else(|| value.as_integer().map(|i| i as f64))
}

fn parse_refine(value: Option<&Value>, default: RefineSettings) -> RefineSettings {
    let mut refine = default;
    if let Some(env) = get_str(value, "api_key_env") {
        refine.api_key_env = env;
    }
    if let Some(model) = get_str(value, "model") {
        refine.model = model;
    }
    if let Some(endpoint) = get_str(value, "endpoint") {
        refine.endpoint = endpoint;
    }
    if let Some(t) = get_number(value, "temperature") {
        if (0.0..=2.0).contains(&t) {
            refine.temperature = t as f32;
        } else {
            warn!("Ignoring out-of-range refine.temperature {}", t);
        }
    }
    if let Some(secs) = value
        .and_then(|v| v.get("timeout_secs"))
        .and_then(|v| v.as_integer())
    {
        if secs > 0 {
            refine.timeout_secs = secs as u64;
        }
    }
    refine
}

fn parse_export(value: Option<&Value>, default: ExportSettings) -> ExportSettings {
    let mut export = default;
    if let Some(scale) = get_number(value, "scale") {
        export.scale = clamp_scale(scale as f32);
    }
    if let Some(dir) = get_str(value, "output_dir") {
        export.output_dir = Some(PathBuf::from(dir));
    }
    export
}

fn parse_logos(value: Option<&Value>) -> LogoSettings {
    LogoSettings {
        organization: get_str(value, "organization"),
        government: get_str(value, "government"),
    }
}

fn parse_fonts(value: Option<&Value>) -> FontSettings {
    let paths = value
        .and_then(|v| v.get("paths"))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|p| p.as_str())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();
    FontSettings {
        family: get_str(value, "family"),
        paths,
    }
}

/// Keeps a scale within [`MIN_SCALE`]..=[`MAX_SCALE`]. Non-finite values
/// become the minimum.
pub fn clamp_scale(scale: f32) -> f32 {
    if !scale.is_finite() || scale < MIN_SCALE {
        warn!("Rasterization scale {} is below {}; using {}", scale, MIN_SCALE, MIN_SCALE);
        MIN_SCALE
    } else if scale > MAX_SCALE {
        warn!("Rasterization scale {} is above {}; using {}", scale, MAX_SCALE, MAX_SCALE);
        MAX_SCALE
    } else {
        scale
    }
}

/// Parses a TOML string into [`Settings`], using defaults for anything
/// missing. Unparseable input yields the defaults.
///
/// ```rust
/// use jobdesc::config::parse_config_string;
///
/// let settings = parse_config_string(r#"
/// [refine]
/// model = "gemini-1.5-pro"
/// temperature = 0.1
///
/// [export]
/// scale = 3
/// "#);
/// assert_eq!(settings.refine.model, "gemini-1.5-pro");
/// assert_eq!(settings.export.scale, 3.0);
/// ```
pub fn parse_config_string(config_str: &str) -> Settings {
    let config: Value = match toml::from_str(config_str) {
        Ok(v) => v,
        Err(e) => {
            warn!("Invalid configuration, using defaults: {}", e);
            return Settings::default();
        }
    };

    let defaults = Settings::default();
    Settings {
        refine: parse_refine(config.get("refine"), defaults.refine),
        export: parse_export(config.get("export"), defaults.export),
        logos: parse_logos(config.get("logos")),
        fonts: parse_fonts(config.get("fonts")),
    }
}

/// Loads settings from the given source. Unreadable files fall back to defaults.
pub fn load_config_from_source(source: ConfigSource) -> Settings {
    match source {
        ConfigSource::Default => Settings::default(),
        ConfigSource::File(path) => match fs::read_to_string(Path::new(path)) {
            Ok(s) => {
                debug!("Loaded configuration from {}", path);
                parse_config_string(&s)
            }
            Err(e) => {
                warn!("Could not read configuration {}: {}; using defaults", path, e);
                Settings::default()
            }
        },
        ConfigSource::Embedded(content) => parse_config_string(content),
    }
}

/// Per-user configuration file (`<config dir>/jobdesc/jobdescrc.toml`), if one exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("jobdesc").join(CONFIG_FILE_NAME))
        .filter(|p| p.is_file())
}

/// Default configuration as TOML text; parsing it yields `Settings::default()`.
pub fn default_config_toml() -> String {
    let d = Settings::default();
    format!(
        r#"# jobdesc configuration

[refine]
# Environment variable holding the text refinement credential.
# When it is unset, job functions are formatted locally as a bullet list.
api_key_env = "{api_key_env}"
model = "{model}"
endpoint = "{endpoint}"
temperature = {temperature:.1}
timeout_secs = {timeout}

[export]
# Rasterization upscale factor ({min_scale:.1} to {max_scale:.1}).
scale = {scale:.1}
# output_dir = "."

[logos]
# Replace the built-in header emblems with a file path or http(s) URL.
# organization = "org-logo.png"
# government = "gov-logo.png"

[fonts]
# family = "Tahoma"
# paths = ["./fonts"]
"#,
        api_key_env = d.refine.api_key_env,
        model = d.refine.model,
        endpoint = d.refine.endpoint,
        temperature = d.refine.temperature,
        timeout = d.refine.timeout_secs,
        min_scale = MIN_SCALE,
        max_scale = MAX_SCALE,
        scale = d.export.scale,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = load_config_from_source(ConfigSource::Default);
        assert_eq!(settings.refine.api_key_env, "API_KEY");
        assert!((settings.refine.temperature - 0.3).abs() < 1e-6);
        assert_eq!(settings.export.scale, 2.0);
        assert!(settings.logos.organization.is_none());
        assert!(settings.fonts.paths.is_empty());
    }

    #[test]
    fn test_full_config() {
        let settings = parse_config_string(
            r#"
            [refine]
            api_key_env = "MY_KEY"
            model = "gemini-pro"
            endpoint = "http://localhost:8080/v1/"
            temperature = 0.5
            timeout_secs = 5

            [export]
            scale = 4
            output_dir = "out"

            [logos]
            organization = "org.png"
            government = "https://example.com/gov.png"

            [fonts]
            family = "DejaVu Sans"
            paths = ["./fonts", "/usr/share/fonts"]
        "#,
        );
        assert_eq!(settings.refine.api_key_env, "MY_KEY");
        assert_eq!(settings.refine.model, "gemini-pro");
        assert_eq!(settings.refine.timeout_secs, 5);
        assert_eq!(settings.export.scale, 4.0);
        assert_eq!(settings.export.output_dir, Some(PathBuf::from("out")));
        assert_eq!(settings.logos.organization.as_deref(), Some("org.png"));
        assert_eq!(settings.fonts.family.as_deref(), Some("DejaVu Sans"));
        assert_eq!(settings.fonts.paths.len(), 2);
    }

    #[test]
    fn test_scale_is_clamped() {
        let settings = parse_config_string("[export]\nscale = 1.0\n");
        assert_eq!(settings.export.scale, MIN_SCALE);
        assert_eq!(clamp_scale(f32::NAN), MIN_SCALE);
        assert_eq!(clamp_scale(3.5), 3.5);
        assert_eq!(clamp_scale(f32::INFINITY), MIN_SCALE);
    }

    #[test]
    fn test_huge_scale_is_capped() {
        let settings = parse_config_string("[export]\nscale = 100000\n");
        assert_eq!(settings.export.scale, MAX_SCALE);
        assert_eq!(clamp_scale(100000.0), MAX_SCALE);
        assert_eq!(clamp_scale(MAX_SCALE), MAX_SCALE);
    }

    #[test]
    fn test_out_of_range_temperature_ignored() {
        let settings = parse_config_string("[refine]\ntemperature = 7.5\n");
        assert_eq!(settings.refine.temperature, RefineSettings::default().temperature);
    }

    #[test]
    fn test_invalid_and_missing_sources_fall_back() {
        assert_eq!(
            load_config_from_source(ConfigSource::Embedded("not toml {{{")),
            Settings::default()
        );
        assert_eq!(
            load_config_from_source(ConfigSource::File("definitely/missing/jobdescrc.toml")),
            Settings::default()
        );
        assert_eq!(load_config_from_source(ConfigSource::Embedded("")), Settings::default());
    }

    #[test]
    fn test_default_config_round_trips() {
        let parsed = parse_config_string(&default_config_toml());
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_blank_credential_counts_as_absent() {
        let settings = RefineSettings {
            api_key_env: "JOBDESC_TEST_BLANK_KEY".to_string(),
            ..RefineSettings::default()
        };
        std::env::set_var("JOBDESC_TEST_BLANK_KEY", "   ");
        let key = settings.api_key();
        std::env::remove_var("JOBDESC_TEST_BLANK_KEY");
        // GEMINI_API_KEY may legitimately be set on a developer machine
        if std::env::var("GEMINI_API_KEY").map(|v| v.trim().is_empty()).unwrap_or(true) {
            assert!(key.is_none());
        }
    }
}
