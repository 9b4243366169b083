//! Virtual raster compositing through GDAL's `gdalbuildvrt`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Name of the compositing executable.
pub const GDALBUILDVRT: &str = "gdalbuildvrt";

/// Directories probed when no GDAL directory is configured. The empty entry
/// means the executable search path.
const DEFAULT_SEARCH_DIRS: [&str; 3] = [
    "",
    "/Library/Frameworks/GDAL.framework/Programs",
    "/usr/local/bin",
];

/// Builds one composite raster out of several band sources.
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Writes a band-separated composite of `inputs`, in order, to `output`.
    ///
    /// Inputs are local paths or `/vsicurl/` URLs.
    async fn build(&self, output: &Path, inputs: &[String]) -> Result<()>;
}

/// [`Compositor`] that runs `gdalbuildvrt -separate <output> <inputs...>`.
///
/// The executable is located on every build so that installing GDAL midway
/// through a session takes effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GdalBuildVrt {
    search_dirs: Vec<PathBuf>,
}

impl Default for GdalBuildVrt {
    fn default() -> Self {
        Self {
            search_dirs: DEFAULT_SEARCH_DIRS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl GdalBuildVrt {
    /// Probes the search path and the usual GDAL install locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes only `dir`.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dirs: vec![dir.into()],
        }
    }

    /// Uses `dir` when given, the default locations otherwise.
    #[must_use]
    pub fn from_config(dir: Option<&Path>) -> Self {
        dir.map_or_else(Self::new, Self::in_dir)
    }

    /// Finds the executable by running `gdalbuildvrt --version` in each
    /// search directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if no directory has the executable.
    pub async fn locate(&self) -> Result<PathBuf> {
        for dir in &self.search_dirs {
            let program = dir.join(GDALBUILDVRT);
            let probe = Command::new(&program)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if probe.is_ok() {
                log::debug!("Using {}", program.display());
                return Ok(program);
            }
        }
        Err(Error::ToolNotFound {
            tool: GDALBUILDVRT.to_string(),
        })
    }
}

#[async_trait]
impl Compositor for GdalBuildVrt {
    async fn build(&self, output: &Path, inputs: &[String]) -> Result<()> {
        let program = self.locate().await?;
        log::info!(
            "Building {} from {} source(s)",
            output.display(),
            inputs.len()
        );

        let result = Command::new(&program)
            .arg("-separate")
            .arg(output)
            .args(inputs)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolNotFound {
                    tool: GDALBUILDVRT.to_string(),
                },
                _ => Error::Io(e),
            })?;

        if !result.status.success() {
            log::error!(
                "{GDALBUILDVRT} failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            );
            return Err(Error::ToolFailed {
                tool: GDALBUILDVRT.to_string(),
                status: result.status.to_string(),
            });
        }
        Ok(())
    }
}
