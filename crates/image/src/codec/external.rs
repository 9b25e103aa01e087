//! Decoding through an external command-line decoder.

use super::Decode;
use super::integrity::verify_integrity;
use crate::{ConvertError, DecodedSurface, ImageFormat, RawInput, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// How to find and run an external decoder.
///
/// `args` may contain `{input}` and `{output}` placeholders. The tool must
/// write a PNG to `{output}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSpec {
    /// Program name or path
    pub program: String,
    /// Arguments with placeholders
    pub args: Vec<String>,
    /// Download location used when the program is not installed
    pub url: Option<String>,
    /// SRI digest the download must match
    pub integrity: Option<String>,
}

impl Default for ToolSpec {
    fn default() -> Self {
        Self {
            program: "heif-dec".to_string(),
            args: vec!["{input}".to_string(), "{output}".to_string()],
            url: None,
            integrity: None,
        }
    }
}

/// Locate the tool: explicit path, then `PATH`, then the codec cache
/// directory, then a verified download into the cache directory.
pub(crate) async fn resolve_tool(
    client: &reqwest::Client,
    spec: &ToolSpec,
    cache_dir: Option<&Path>,
    format: ImageFormat,
) -> Result<PathBuf> {
    let explicit = Path::new(&spec.program);
    if explicit.is_absolute() && explicit.is_file() {
        return Ok(explicit.to_path_buf());
    }

    if let Ok(path) = which::which(&spec.program) {
        debug!(path = %path.display(), "Found decoder on PATH");
        return Ok(path);
    }

    let cached = cache_dir.map(|dir| dir.join(&spec.program));
    if let Some(path) = cached.as_ref().filter(|p| p.is_file()) {
        if cached_tool_usable(path, spec.integrity.as_deref()).await {
            debug!(path = %path.display(), "Found cached decoder");
            return Ok(path.clone());
        }
        warn!(path = %path.display(), "Cached decoder failed verification, removing");
        if let Err(e) = tokio::fs::remove_file(path).await {
            return Err(ConvertError::codec_load(
                format,
                format!("could not remove unusable cached decoder {}: {}", path.display(), e),
            ));
        }
    }

    let (Some(url), Some(target)) = (spec.url.as_deref(), cached) else {
        return Err(ConvertError::codec_load(
            format,
            format!("'{}' is not installed and no download URL is configured", spec.program),
        ));
    };

    download(client, url, spec.integrity.as_deref(), &target, format).await?;

    if !target.is_file() {
        return Err(ConvertError::codec_load(
            format,
            format!("'{}' not available after download", spec.program),
        ));
    }
    Ok(target)
}

/// A cached tool is only trusted when it is executable and, if an
/// integrity digest is configured, its contents still match it.
async fn cached_tool_usable(path: &Path, integrity: Option<&str>) -> bool {
    if !is_executable(path) {
        return false;
    }
    match integrity {
        Some(integrity) => match tokio::fs::read(path).await {
            Ok(bytes) => verify_integrity(&bytes, integrity),
            Err(_) => false,
        },
        None => true,
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    integrity: Option<&str>,
    target: &Path,
    format: ImageFormat,
) -> Result<()> {
    info!(url, "Downloading decoder");
    let fail = |e: &dyn std::fmt::Display| ConvertError::codec_load(format, e);

    let body = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| fail(&e))?
        .bytes()
        .await
        .map_err(|e| fail(&e))?;

    if let Some(integrity) = integrity {
        if !verify_integrity(&body, integrity) {
            return Err(ConvertError::codec_load(format, "integrity check failed"));
        }
    }

    let size = body.len();
    let path = target.to_path_buf();
    tokio::task::spawn_blocking(move || install(&body, &path))
        .await
        .map_err(|e| fail(&e))?
        .map_err(|e| fail(&e))?;

    debug!(path = %target.display(), bytes = size, "Decoder saved");
    Ok(())
}

/// Write `body` to a temp file next to `target`, mark it executable, then
/// rename it into place. `target` either does not exist or is complete.
fn install(body: &[u8], target: &Path) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(body)?;
    staged.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))?;
    }

    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Decoder that shells out to a tool and reads back a PNG.
#[derive(Debug, Clone)]
pub struct ToolDecoder {
    program: PathBuf,
    args: Vec<String>,
}

impl ToolDecoder {
    /// Wrap a resolved program.
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    fn expand(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl Decode for ToolDecoder {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("external")
    }

    fn decode(&self, input: &RawInput, format: ImageFormat) -> Result<DecodedSurface> {
        let fail = |reason: String| ConvertError::decode(input.name(), format, reason);

        let dir = tempfile::tempdir().map_err(|e| fail(e.to_string()))?;
        let in_path = dir.path().join(format!("input.{}", format.name()));
        let out_path = dir.path().join("output.png");
        std::fs::write(&in_path, input.bytes()).map_err(|e| fail(e.to_string()))?;

        let output = Command::new(&self.program)
            .args(self.expand(&in_path, &out_path))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| fail(format!("failed to run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!(
                "{} exited with {}: {}",
                self.name(),
                output.status,
                stderr.trim()
            )));
        }

        let png = std::fs::read(&out_path).map_err(|e| fail(format!("no output image: {}", e)))?;
        let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .map_err(|e| fail(e.to_string()))?;
        Ok(DecodedSurface::from(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_expansion() {
        let decoder = ToolDecoder::new(
            PathBuf::from("/usr/bin/heif-dec"),
            vec!["--quiet".into(), "{input}".into(), "-o={output}".into()],
        );
        let args = decoder.expand(Path::new("/t/in.heic"), Path::new("/t/out.png"));
        assert_eq!(args, ["--quiet", "/t/in.heic", "-o=/t/out.png"]);
        assert_eq!(decoder.name(), "heif-dec");
    }

    #[tokio::test]
    async fn test_missing_tool_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ToolSpec {
            program: "covert-test-missing-tool".into(),
            ..ToolSpec::default()
        };
        let err = resolve_tool(&reqwest::Client::new(), &spec, Some(dir.path()), ImageFormat::Heic)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CodecLoadFailed);
        assert!(err.to_string().contains("no download URL"));
    }

    fn write_tool(dir: &Path, name: &str, body: &[u8], executable: bool) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if executable { 0o755 } else { 0o644 };
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = executable;
        path
    }

    #[tokio::test]
    async fn test_cached_tool_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_tool(dir.path(), "covert-test-cached", b"#!/bin/sh\n", true);
        let spec = ToolSpec {
            program: "covert-test-cached".into(),
            ..ToolSpec::default()
        };
        let path = resolve_tool(&reqwest::Client::new(), &spec, Some(dir.path()), ImageFormat::Heic)
            .await
            .unwrap();
        assert_eq!(path, tool);
    }

    #[tokio::test]
    async fn test_cached_tool_with_matching_integrity_is_found() {
        use base64::Engine;
        use sha2::{Digest, Sha384};

        let dir = tempfile::tempdir().unwrap();
        let body = b"#!/bin/sh\nexit 0\n";
        let tool = write_tool(dir.path(), "covert-test-pinned", body, true);
        let digest = base64::engine::general_purpose::STANDARD.encode(Sha384::digest(body));
        let spec = ToolSpec {
            program: "covert-test-pinned".into(),
            integrity: Some(format!("sha384-{}", digest)),
            ..ToolSpec::default()
        };
        let path = resolve_tool(&reqwest::Client::new(), &spec, Some(dir.path()), ImageFormat::Heic)
            .await
            .unwrap();
        assert_eq!(path, tool);
    }

    #[tokio::test]
    async fn test_tampered_cached_tool_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_tool(dir.path(), "covert-test-tampered", b"junk", true);
        let spec = ToolSpec {
            program: "covert-test-tampered".into(),
            integrity: Some(format!("sha384-{}", "A".repeat(64))),
            ..ToolSpec::default()
        };
        let err = resolve_tool(&reqwest::Client::new(), &spec, Some(dir.path()), ImageFormat::Heic)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CodecLoadFailed);
        assert!(!tool.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_executable_cached_tool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_tool(dir.path(), "covert-test-half-installed", b"#!/bin/sh\n", false);
        let spec = ToolSpec {
            program: "covert-test-half-installed".into(),
            ..ToolSpec::default()
        };
        let err = resolve_tool(&reqwest::Client::new(), &spec, Some(dir.path()), ImageFormat::Heic)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CodecLoadFailed);
        assert!(!tool.exists());
    }

    #[test]
    fn test_install_leaves_only_the_finished_tool() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("tools").join("heif-dec");
        install(b"#!/bin/sh\n", &target).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"#!/bin/sh\n");
        assert!(is_executable(&target));
        let entries = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_decode_round_trip() {
        use image::{Rgba, RgbaImage};
        use std::io::Cursor;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-decoder");
        std::fs::write(&script, "#!/bin/sh\ncp \"$1\" \"$2\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut png = Cursor::new(Vec::new());
        RgbaImage::from_pixel(5, 3, Rgba([1, 2, 3, 255]))
            .write_to(&mut png, image::ImageOutputFormat::Png)
            .unwrap();

        let decoder = ToolDecoder::new(script, ToolSpec::default().args);
        let input = RawInput::new("photo.heic", png.into_inner());
        let surface = decoder.decode(&input, ImageFormat::Heic).unwrap();
        assert_eq!(surface.dimensions(), (5, 3));
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_failure_is_decode_failure() {
        let decoder = ToolDecoder::new(PathBuf::from("false"), Vec::new());
        let input = RawInput::new("photo.heic", vec![0u8; 8]);
        let err = decoder.decode(&input, ImageFormat::Heic).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DecodeFailed);
    }
}
