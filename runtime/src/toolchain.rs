//! Turning a generated work-group module into a loadable artifact.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

use snafu::{ResultExt, ensure};
use tessel_device::Device;
use tessel_schedule::WorkGroupModule;

use crate::config::ToolchainConfig;
use crate::error::{CacheIoSnafu, Result, ToolchainFailedSnafu, ToolchainSpawnSnafu};

pub trait Toolchain: Send + Sync {
    /// Write the artifact for `module` on `device` to `output`.
    fn generate_artifact(&self, module: &WorkGroupModule, device: &Device, output: &Path) -> Result<()>;
}

/// Runs external code generator, assembler and linker commands.
///
/// The module text is written to a scratch directory, compiled to assembly,
/// assembled to an object and linked into a shared object at `output`.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    config: ToolchainConfig,
    cross_compile: bool,
    verbose: bool,
}

impl CommandToolchain {
    pub fn new(config: ToolchainConfig, cross_compile: bool, verbose: bool) -> Self {
        Self { config, cross_compile, verbose }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    fn run(&self, tool: &str, args: Vec<OsString>) -> Result<()> {
        let program = self.config.program(tool, self.cross_compile);
        if self.verbose {
            tracing::info!(%program, ?args, "running toolchain command");
        } else {
            tracing::debug!(%program, ?args, "running toolchain command");
        }

        let output = Command::new(&program).args(&args).output().context(ToolchainSpawnSnafu { program: &program })?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        ensure!(
            output.status.success(),
            ToolchainFailedSnafu { program: &program, status: output.status.to_string(), stderr }
        );
        if !stderr.is_empty() {
            tracing::warn!(%program, %stderr, "toolchain diagnostics");
        }
        Ok(())
    }
}

impl Toolchain for CommandToolchain {
    #[tracing::instrument(skip_all, fields(kernel = %module.kernel, device = %device.name(), handler = %module.handler))]
    fn generate_artifact(&self, module: &WorkGroupModule, device: &Device, output: &Path) -> Result<()> {
        let scratch = tempfile::tempdir().context(CacheIoSnafu { path: std::env::temp_dir() })?;
        let source = scratch.path().join("parallel.ir");
        let assembly = scratch.path().join("parallel.s");
        let object = scratch.path().join("parallel.o");
        std::fs::write(&source, module.module.to_string()).context(CacheIoSnafu { path: &source })?;

        let started = Instant::now();
        let llc_args = self
            .config
            .llc_flags
            .iter()
            .map(OsString::from)
            .chain([OsString::from("-o"), assembly.clone().into_os_string(), source.into_os_string()])
            .collect();
        self.run(&self.config.llc, llc_args)?;

        let as_args = self
            .config
            .assembler_flags
            .iter()
            .map(OsString::from)
            .chain(["-c".into(), "-o".into(), object.clone().into_os_string(), assembly.into_os_string()])
            .collect();
        self.run(&self.config.clang, as_args)?;

        let ld_args = self
            .config
            .linker_flags
            .iter()
            .map(OsString::from)
            .chain(["-o".into(), output.as_os_str().to_os_string(), object.into_os_string()])
            .collect();
        self.run(&self.config.linker, ld_args)?;

        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "artifact linked");
        Ok(())
    }
}
