//! Host detection, executable lookup and package-manager commands.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Result, bail};
use tracing::debug;

use crate::core::types::{Platform, ProgramRequest};

/// Detect the running host. Anything other than Linux, macOS or Windows is
/// rejected.
pub fn detect_platform() -> Result<Platform> {
    match Platform::from_os_name(env::consts::OS) {
        Some(platform) => Ok(platform),
        None => bail!("Unsupported operating system: {}", env::consts::OS),
    }
}

/// Directories searched for executables.
///
/// Installer steps that change where binaries live return a new `SearchPath`
/// instead of editing the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn from_env() -> Self {
        Self::from_os_value(env::var_os("PATH"))
    }

    fn from_os_value(value: Option<OsString>) -> Self {
        let dirs = value
            .map(|v| env::split_paths(&v).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.iter().any(|d| d == dir)
    }

    /// First match for `program` (with `.exe` appended on Windows).
    pub fn find(&self, program: &str) -> Option<PathBuf> {
        let names: Vec<String> = if cfg!(windows) && !program.ends_with(".exe") {
            vec![format!("{program}.exe"), program.to_string()]
        } else {
            vec![program.to_string()]
        };
        self.dirs
            .iter()
            .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }

    pub fn has(&self, program: &str) -> bool {
        self.find(program).is_some()
    }

    pub fn with_prepended(&self, dir: impl Into<PathBuf>) -> Self {
        let mut dirs = vec![dir.into()];
        dirs.extend(self.dirs.iter().cloned());
        Self { dirs }
    }

    pub fn with_appended(&self, dir: impl Into<PathBuf>) -> Self {
        let mut dirs = self.dirs.clone();
        dirs.push(dir.into());
        Self { dirs }
    }

    /// Value suitable for a child's `PATH`.
    pub fn to_os_string(&self) -> OsString {
        env::join_paths(&self.dirs).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Brew,
    Choco,
}

const LINUX_PROBE_ORDER: [PackageManager; 4] = [
    PackageManager::Apt,
    PackageManager::Dnf,
    PackageManager::Yum,
    PackageManager::Pacman,
];

impl PackageManager {
    /// Executable probed for during detection.
    pub fn executable(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Brew => "brew",
            Self::Choco => "choco",
        }
    }

    /// The package manager to use on `platform`, if one is installed.
    pub fn detect(platform: Platform, path: &SearchPath) -> Option<Self> {
        let found = match platform {
            Platform::Linux => LINUX_PROBE_ORDER
                .into_iter()
                .find(|pm| path.has(pm.executable())),
            Platform::Darwin => Some(Self::Brew).filter(|pm| path.has(pm.executable())),
            Platform::Windows => Some(Self::Choco).filter(|pm| path.has(pm.executable())),
        };
        debug!(%platform, manager = ?found, "package manager detection");
        found
    }

    /// Commands to run, in order, to install `programs`.
    ///
    /// Executables are resolved through `path`, which also becomes each
    /// child's `PATH`, so a manager installed earlier in this run is found.
    pub fn install_commands(self, programs: &ProgramRequest, path: &SearchPath) -> Vec<Command> {
        let packages = programs.as_slice();
        let manager = resolve(path, self.executable());
        let mut commands = match self {
            Self::Apt => vec![
                sudo(path, &manager, &["update"]),
                with_packages(sudo(path, &manager, &["install", "-y"]), packages),
            ],
            Self::Dnf | Self::Yum => vec![with_packages(
                sudo(path, &manager, &["install", "-y"]),
                packages,
            )],
            Self::Pacman => vec![with_packages(
                sudo(path, &manager, &["-Syu", "--noconfirm"]),
                packages,
            )],
            Self::Brew => {
                let mut cmd = Command::new(&manager);
                cmd.arg("install");
                vec![with_packages(cmd, packages)]
            }
            Self::Choco => {
                let mut cmd = Command::new(&manager);
                cmd.args(["install", "-y"]);
                vec![with_packages(cmd, packages)]
            }
        };
        for cmd in &mut commands {
            cmd.env("PATH", path.to_os_string());
        }
        commands
    }
}

/// Absolute path of `program` when `path` has it, the bare name otherwise.
fn resolve(path: &SearchPath, program: &str) -> PathBuf {
    path.find(program).unwrap_or_else(|| PathBuf::from(program))
}

fn sudo(path: &SearchPath, program: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(resolve(path, "sudo"));
    cmd.arg(program).args(args);
    cmd
}

fn with_packages(mut cmd: Command, packages: &[String]) -> Command {
    cmd.args(packages);
    cmd
}
