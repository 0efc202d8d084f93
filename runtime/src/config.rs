//! Runtime and toolchain configuration.
//!
//! Both configurations have a bon builder for explicit setup and a `from_env`
//! constructor that falls back to defaults for unset or unparsable variables.

use std::path::PathBuf;

use bon::bon;
use tessel_schedule::WorkGroupMethod;

// ============================================================================
// RUNTIME
// ============================================================================

/// Launch-path settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Root of the work-group artifact cache.
    pub cache_dir: PathBuf,
    /// Requested work-group generation method. SPMD devices override it.
    pub method: WorkGroupMethod,
    /// Use the cross toolchain prefix when producing artifacts.
    pub cross_compile: bool,
    /// Log every toolchain command at info level.
    pub verbose: bool,
}

#[bon]
impl RuntimeConfig {
    #[builder]
    pub fn new(
        #[builder(into)] cache_dir: Option<PathBuf>,
        #[builder(default)] method: WorkGroupMethod,
        #[builder(default = false)] cross_compile: bool,
        #[builder(default = false)] verbose: bool,
    ) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(|| default_cache_dir(&env_lookup));
        Self { cache_dir, method, cross_compile, verbose }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSEL_CACHE_DIR` - Cache root (default: `$XDG_CACHE_HOME/tessel`, else the temp dir)
    /// * `TESSEL_WORK_GROUP_METHOD` - `loops`, `loopvec` or `spmd` (default: loops)
    /// * `TESSEL_CROSS_COMPILE` - Use the cross toolchain (default: off)
    /// * `TESSEL_VERBOSE` - Log toolchain commands (default: off)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Same as [`RuntimeConfig::from_env`], reading variables through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let cache_dir = var("TESSEL_CACHE_DIR").filter(|s| !s.is_empty()).map(PathBuf::from);
        let method = var("TESSEL_WORK_GROUP_METHOD").and_then(|s| s.trim().parse().ok()).unwrap_or_default();
        let cross_compile = var("TESSEL_CROSS_COMPILE").and_then(|s| parse_bool(&s)).unwrap_or(false);
        let verbose = var("TESSEL_VERBOSE").and_then(|s| parse_bool(&s)).unwrap_or(false);

        Self { cache_dir: cache_dir.unwrap_or_else(|| default_cache_dir(&var)), method, cross_compile, verbose }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

// ============================================================================
// TOOLCHAIN
// ============================================================================

/// External commands that turn a work-group module into a shared object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// Code generator: module text to assembly.
    pub llc: String,
    /// Assembler driver: assembly to object.
    pub clang: String,
    /// Linker driver: object to shared object.
    pub linker: String,
    pub llc_flags: Vec<String>,
    pub assembler_flags: Vec<String>,
    pub linker_flags: Vec<String>,
    /// Prepended to every program name when cross compiling.
    pub cross_prefix: String,
}

#[bon]
impl ToolchainConfig {
    #[builder]
    pub fn new(
        #[builder(into, default = "llc")] llc: String,
        #[builder(into, default = "clang")] clang: String,
        #[builder(into, default = "clang")] linker: String,
        #[builder(default = vec!["-O2".to_string(), "-relocation-model=pic".to_string()])] llc_flags: Vec<String>,
        #[builder(default)] assembler_flags: Vec<String>,
        #[builder(default = vec!["-shared".to_string()])] linker_flags: Vec<String>,
        #[builder(into, default)] cross_prefix: String,
    ) -> Self {
        Self { llc, clang, linker, llc_flags, assembler_flags, linker_flags, cross_prefix }
    }
}

impl ToolchainConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSEL_LLC`, `TESSEL_CLANG`, `TESSEL_LINK` - Program names
    /// * `TESSEL_LLC_FLAGS`, `TESSEL_AS_FLAGS`, `TESSEL_LD_FLAGS` - Whitespace-separated flags
    /// * `TESSEL_CROSS_PREFIX` - Cross toolchain prefix, e.g. `riscv64-unknown-linux-gnu-`
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::builder().build();
        let program = |key: &str, default: String| var(key).filter(|s| !s.trim().is_empty()).unwrap_or(default);
        let flags = |key: &str, default: Vec<String>| {
            var(key).map(|s| s.split_whitespace().map(str::to_string).collect()).unwrap_or(default)
        };

        Self {
            llc: program("TESSEL_LLC", defaults.llc),
            clang: program("TESSEL_CLANG", defaults.clang),
            linker: program("TESSEL_LINK", defaults.linker),
            llc_flags: flags("TESSEL_LLC_FLAGS", defaults.llc_flags),
            assembler_flags: flags("TESSEL_AS_FLAGS", defaults.assembler_flags),
            linker_flags: flags("TESSEL_LD_FLAGS", defaults.linker_flags),
            cross_prefix: var("TESSEL_CROSS_PREFIX").unwrap_or(defaults.cross_prefix),
        }
    }

    /// Program name for `tool`, with the cross prefix applied when asked.
    pub fn program(&self, tool: &str, cross_compile: bool) -> String {
        if cross_compile { format!("{}{tool}", self.cross_prefix) } else { tool.to_string() }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn default_cache_dir(var: &impl Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_CACHE_HOME")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("tessel")
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
