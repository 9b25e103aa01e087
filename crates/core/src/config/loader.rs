//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{Error, ErrorCode, Result};
use covert_image::codec::is_valid_sri;
use std::path::Path;

/// Standard locations, in lookup order
const CANDIDATES: [&str; 3] = [".covert.toml", "covert.toml", ".config/covert.toml"];

/// Configuration wrapper
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed settings
    pub schema: ConfigSchema,
    /// File the settings came from, if any
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a file path or the standard locations, falling
    /// back to defaults. An explicit path that does not exist is an error.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_from(path, Path::new("."))
    }

    /// Like [`Config::load`], resolving the standard locations under `root`.
    pub fn load_from(path: Option<&str>, root: &Path) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !Path::new(p).exists() {
                    return Err(Error::config_not_found(p));
                }
                Some(p.to_string())
            }
            None => find_config_file(root),
        };

        let schema = match config_path {
            Some(ref p) => load_config_file(p)?,
            None => ConfigSchema::default(),
        };

        let config = Self {
            schema,
            path: config_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Called by `load`; call again after applying
    /// command-line overrides.
    pub fn validate(&self) -> Result<()> {
        let schema = &self.schema;
        let search = &schema.optimize.settings;

        check_unit("convert.quality", schema.convert.quality)?;
        check_unit("optimize.quality_min", search.quality_min)?;
        check_unit("optimize.quality_max", search.quality_max)?;
        check_unit("optimize.scale_min", search.scale_min)?;
        check_unit("optimize.scale_max", search.scale_max)?;

        if search.quality_min > search.quality_max {
            return Err(Error::config_invalid(format!(
                "optimize.quality_min ({}) is greater than optimize.quality_max ({})",
                search.quality_min, search.quality_max
            )));
        }
        if search.scale_min > search.scale_max {
            return Err(Error::config_invalid(format!(
                "optimize.scale_min ({}) is greater than optimize.scale_max ({})",
                search.scale_min, search.scale_max
            )));
        }
        if search.max_iterations == 0 {
            return Err(Error::config_invalid("optimize.max_iterations must be at least 1"));
        }
        if !(search.quality_tolerance > 0.0 && search.scale_tolerance > 0.0) {
            return Err(Error::config_invalid("optimize tolerances must be positive"));
        }
        if search.sample_count == 0 {
            return Err(Error::config_invalid("optimize.sample_count must be at least 1"));
        }

        if schema.codecs.load_timeout_secs == 0 {
            return Err(Error::config_invalid("codecs.load_timeout_secs must be at least 1"));
        }
        if let Some(integrity) = &schema.codecs.heic.integrity {
            if !is_valid_sri(integrity) {
                return Err(Error::config_invalid(format!(
                    "codecs.heic.integrity is not a sha256/sha384/sha512 SRI string: {}",
                    integrity
                )));
            }
        }

        Ok(())
    }
}

fn check_unit(key: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::config_invalid(format!("{} must be in (0, 1], got {}", key, value)))
    }
}

/// Find configuration file in standard locations
fn find_config_file(root: &Path) -> Option<String> {
    CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.exists())
        .map(|path| path.to_string_lossy().into_owned())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &str) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::new(ErrorCode::ConfigError, format!("Failed to read config file {}", path))
            .with_source(e)
    })?;

    toml::from_str(&content).map_err(|e| Error::from(e).with_context(format!("In {}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use covert_image::{NetworkHint, OutputFormat};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.path.is_none());
        assert_eq!(config.schema.convert.output_format, OutputFormat::Jpeg);
        assert!((config.schema.convert.quality - 0.92).abs() < f32::EPSILON);
        assert_eq!(config.schema.optimize.settings.max_iterations, 8);
        assert_eq!(config.schema.codecs.load_timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(None, dir.path()).unwrap();
        assert!(config.path.is_none());
        assert_eq!(config.schema, ConfigSchema::default());
    }

    #[test]
    fn test_discovery_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".config/covert.toml", "[convert]\noutput_format = \"png\"\n");
        write(&dir, "covert.toml", "[convert]\nquality = 0.5\n");

        let config = Config::load_from(None, dir.path()).unwrap();
        assert!(config.path.unwrap().ends_with("covert.toml"));
        assert!((config.schema.convert.quality - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.schema.convert.output_format, OutputFormat::Jpeg);
    }

    #[test]
    fn test_full_file() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "covert.toml",
            r#"
[convert]
output_format = "png"
quality = 0.8

[optimize]
target_bytes = 204800
lock_dimensions = true
max_iterations = 6
scale_min = 0.5

[codecs]
load_timeout_secs = 5
network = "slow"

[codecs.heic]
program = "/opt/heif/heif-dec"
integrity = "sha384-oqVuAfXRKap7fdgcCY5uykM6+R9GqQ8K/uxy9rx7HNQlGYl1kPzQho1wx4JwY8wC"

[limits]
batch_warning_threshold = 10

[logging]
level = "debug"
json = true
"#,
        );

        let config = Config::load(Some(path.as_str())).unwrap();
        let schema = &config.schema;
        assert_eq!(schema.optimize.target_bytes, 204_800);
        assert!(schema.optimize.lock_dimensions);
        assert_eq!(schema.optimize.settings.max_iterations, 6);
        assert!((schema.optimize.settings.scale_min - 0.5).abs() < f32::EPSILON);
        assert!((schema.optimize.settings.quality_min - 0.10).abs() < f32::EPSILON);
        assert_eq!(schema.codecs.network, NetworkHint::Slow);
        assert_eq!(schema.codecs.heic.program, "/opt/heif/heif-dec");
        assert_eq!(schema.limits.batch_warning_threshold, 10);
        assert!(schema.logging.json);

        let options = schema.convert_options();
        assert_eq!(options.output_format, OutputFormat::Png);
        assert!(options.optimizes());
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = Config::load(Some("/nonexistent/covert.toml")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigNotFound);
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "covert.toml", "[convert\nquality = ");
        let err = Config::load(Some(path.as_str())).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigParseError);
        assert!(err.context.is_some());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "[convert]\nquality = 0.0\n",
            "[convert]\nquality = 1.5\n",
            "[optimize]\nquality_min = 0.9\nquality_max = 0.5\n",
            "[optimize]\nscale_min = 0.8\nscale_max = 0.4\n",
            "[optimize]\nmax_iterations = 0\n",
            "[codecs]\nload_timeout_secs = 0\n",
            "[codecs.heic]\nintegrity = \"md5-abc\"\n",
        ];

        for case in cases {
            let dir = TempDir::new().unwrap();
            let path = write(&dir, "covert.toml", case);
            let err = Config::load(Some(path.as_str())).unwrap_err();
            assert_eq!(err.code, ErrorCode::ConfigValidationError, "case: {}", case);
        }
    }
}
