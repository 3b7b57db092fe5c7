//! Control-machine bootstrap: pip, Ansible, Homebrew and Chocolatey.
//!
//! Every step that changes where executables live returns an updated
//! [`SearchPath`]; the process environment is never modified.

use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::types::Platform;
use crate::io::platform::SearchPath;
use crate::io::process::{CommandLimits, run_checked, run_command};

pub const HOMEBREW_INSTALL_URL: &str =
    "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh";
pub const CHOCOLATEY_INSTALL_URL: &str = "https://community.chocolatey.org/install.ps1";
const ANSIBLE_PLAYBOOK: &str = "ansible-playbook";
const HOMEBREW_BIN_DIRS: [&str; 2] = ["/opt/homebrew/bin", "/usr/local/bin"];

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(
        "An existing Chocolatey directory was found at {}. If the 'choco' command is not \
         working, the installation may be broken or PATH may not be configured correctly. \
         Inspect the directory and consider reinstalling Chocolatey manually; you may need \
         to delete the directory first.",
        .dir.display()
    )]
    ExistingChocolatey { dir: PathBuf },
    #[error("Automatic Ansible install not supported on {0}")]
    AnsibleUnsupported(Platform),
    #[error(
        "Ansible installation failed or ansible-playbook still not in PATH. Please check your setup."
    )]
    AnsibleMissing,
}

/// How bootstrap commands are run.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub python: String,
    pub limits: CommandLimits,
    /// Whether pip installs target an active virtualenv.
    pub in_virtualenv: bool,
    pub home: Option<PathBuf>,
}

impl Bootstrap {
    pub fn from_env(python: impl Into<String>, limits: CommandLimits) -> Self {
        Self {
            python: python.into(),
            limits,
            in_virtualenv: env::var_os("VIRTUAL_ENV").is_some_and(|v| !v.is_empty()),
            home: env::var_os("HOME")
                .or_else(|| env::var_os("USERPROFILE"))
                .map(PathBuf::from),
        }
    }

    pub fn pip_check_command(&self) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "pip", "--version"]);
        cmd
    }

    /// `python -m pip install [--user] <package>`; `--user` only outside a
    /// virtualenv.
    pub fn pip_install_command(&self, package: &str) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "pip", "install"]);
        if !self.in_virtualenv {
            cmd.arg("--user");
        }
        cmd.arg(package);
        cmd
    }

    pub fn ensurepip_command(&self) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "ensurepip", "--upgrade"]);
        if !self.in_virtualenv {
            cmd.arg("--user");
        }
        cmd
    }

    pub fn check_pip(&self) -> bool {
        match run_command(self.pip_check_command(), self.limits) {
            Ok(output) => output.success(),
            Err(err) => {
                warn!(err = %err, "pip check could not run");
                false
            }
        }
    }

    /// Install pip when it is missing.
    pub fn ensure_pip(&self, out: &mut dyn Write) -> Result<()> {
        if self.check_pip() {
            return Ok(());
        }
        writeln!(out, "Pip not found. Installing pip...")?;
        run_checked(self.ensurepip_command(), self.limits, true).context("install pip")?;
        Ok(())
    }

    pub fn pip_install(&self, package: &str) -> Result<()> {
        run_checked(self.pip_install_command(package), self.limits, true)
            .with_context(|| format!("pip install {package}"))?;
        Ok(())
    }

    /// Make sure `ansible-playbook` can be found, installing Ansible if needed.
    #[instrument(skip_all, fields(%platform))]
    pub fn ensure_ansible(
        &self,
        platform: Platform,
        path: &SearchPath,
        out: &mut dyn Write,
    ) -> Result<SearchPath> {
        if path.has(ANSIBLE_PLAYBOOK) {
            writeln!(out, "Ansible is already installed.")?;
            return Ok(path.clone());
        }
        writeln!(out, "Ansible not found. Installing Ansible...")?;

        let path = match platform {
            Platform::Darwin => {
                let path = if path.has("brew") {
                    path.clone()
                } else {
                    self.install_homebrew(path, out)?
                };
                let mut brew = Command::new(path.find("brew").unwrap_or_else(|| "brew".into()));
                brew.args(["install", "ansible"]);
                match run_checked(brew, self.limits, true) {
                    Ok(_) => path,
                    Err(err) => {
                        warn!(err = %err, "brew install failed");
                        writeln!(out, "Homebrew install failed, trying pip install...")?;
                        self.pip_install("ansible")?;
                        self.advise_path_update(&path, out)?;
                        self.with_user_bins(&path)
                    }
                }
            }
            Platform::Linux => {
                writeln!(out, "Installing Ansible with pip...")?;
                self.pip_install("ansible")?;
                self.advise_path_update(path, out)?;
                self.with_user_bins(path)
            }
            Platform::Windows => return Err(BootstrapError::AnsibleUnsupported(platform).into()),
        };

        if !path.has(ANSIBLE_PLAYBOOK) {
            return Err(BootstrapError::AnsibleMissing.into());
        }
        writeln!(out, "Ansible installed successfully.")?;
        info!("ansible installed");
        Ok(path)
    }

    /// User-local bin directories pip may install into.
    pub fn user_bin_dirs(&self) -> Vec<PathBuf> {
        match &self.home {
            Some(home) => vec![
                home.join(".local/bin"),
                home.join("Library/Python/3.13/bin"),
            ],
            None => Vec::new(),
        }
    }

    fn with_user_bins(&self, path: &SearchPath) -> SearchPath {
        self.user_bin_dirs()
            .into_iter()
            .filter(|dir| !path.contains(dir))
            .fold(path.clone(), |acc, dir| acc.with_appended(dir))
    }

    /// Existing user-local bin directories missing from `path`.
    pub fn missing_user_bins(&self, path: &SearchPath) -> Vec<PathBuf> {
        self.user_bin_dirs()
            .into_iter()
            .filter(|dir| dir.is_dir() && !path.contains(dir))
            .collect()
    }

    /// Print shell-profile advice for user-local bin directories not on PATH.
    pub fn advise_path_update(&self, path: &SearchPath, out: &mut dyn Write) -> Result<()> {
        let missing = self.missing_user_bins(path);
        if missing.is_empty() {
            return Ok(());
        }
        let joined = missing
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        writeln!(
            out,
            "\n*** Important: To use Ansible from the command line, add the following to your shell profile (~/.zshrc or ~/.bash_profile):"
        )?;
        writeln!(out, "export PATH=\"{joined}:$PATH\"")?;
        writeln!(
            out,
            "Then restart your terminal or run `source ~/.zshrc` (or your shell config file). ***\n"
        )?;
        Ok(())
    }

    pub fn install_homebrew(&self, path: &SearchPath, out: &mut dyn Write) -> Result<SearchPath> {
        writeln!(out, "Installing Homebrew...")?;
        run_checked(homebrew_install_command(), self.limits, true).context("install Homebrew")?;
        writeln!(out, "Homebrew installed.")?;
        Ok(HOMEBREW_BIN_DIRS
            .iter()
            .map(Path::new)
            .filter(|dir| !path.contains(dir))
            .fold(path.clone(), |acc, dir| acc.with_appended(dir)))
    }

    /// Install Chocolatey unless a previous install directory exists.
    pub fn install_chocolatey(
        &self,
        choco_dir: &Path,
        path: &SearchPath,
        out: &mut dyn Write,
    ) -> Result<SearchPath> {
        if choco_dir.is_dir() {
            return Err(BootstrapError::ExistingChocolatey {
                dir: choco_dir.to_path_buf(),
            }
            .into());
        }
        writeln!(out, "Installing Chocolatey...")?;
        run_checked(chocolatey_install_command(), self.limits, true)
            .context("install Chocolatey")?;
        writeln!(out, "Chocolatey installed.")?;
        Ok(path.with_prepended(choco_dir.join("bin")))
    }
}

/// `%ProgramData%\chocolatey`.
pub fn chocolatey_dir() -> PathBuf {
    env::var_os("ProgramData")
        .map_or_else(|| PathBuf::from(r"C:\ProgramData"), PathBuf::from)
        .join("chocolatey")
}

pub fn homebrew_install_command() -> Command {
    let mut cmd = Command::new("/bin/bash");
    cmd.arg("-c")
        .arg(format!("/bin/bash -c \"$(curl -fsSL {HOMEBREW_INSTALL_URL})\""));
    cmd
}

pub fn chocolatey_install_command() -> Command {
    let mut cmd = Command::new("powershell.exe");
    cmd.arg("-Command").arg(format!(
        "Set-ExecutionPolicy Bypass -Scope Process -Force; \
         [System.Net.ServicePointManager]::SecurityProtocol = \
         [System.Net.ServicePointManager]::SecurityProtocol -bor 3072; \
         iex ((New-Object System.Net.WebClient).DownloadString('{CHOCOLATEY_INSTALL_URL}'))"
    ));
    cmd
}
