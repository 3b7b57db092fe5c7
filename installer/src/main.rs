//! `program-installer`: set up a workstation from an LLM-generated Ansible
//! playbook.
//!
//! Picks a program list, asks a completion endpoint for a playbook that
//! installs it, repairs the playbook until `ansible-playbook --syntax-check`
//! accepts it, then runs it. Windows (and `--direct`) installs through the
//! native package manager instead.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::debug;

use installer::core::catalog::Tier;
use installer::core::types::Platform;
use installer::exit_codes;
use installer::io::bootstrap::{Bootstrap, chocolatey_dir};
use installer::io::completion::ProviderRouter;
use installer::io::config::{DEFAULT_CONFIG_PATH, InstallerConfig, load_config, write_config};
use installer::io::credentials::Credentials;
use installer::io::platform::{PackageManager, SearchPath, detect_platform};
use installer::io::playbook::AnsiblePlaybook;
use installer::io::sleeper::ThreadSleeper;
use installer::logging;
use installer::run::{RunDeps, RunRequest, direct_install, run_pipeline};
use installer::select::select_programs;

#[derive(Parser)]
#[command(
    name = "program-installer",
    version,
    disable_version_flag = true,
    about = "A tool to automate the setup of a development environment on macOS, Linux, and Windows."
)]
struct Cli {
    /// Print version.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
    /// Path to the Ansible inventory file.
    #[arg(short, long, value_name = "PATH")]
    inventory: Option<PathBuf>,
    /// Installer config file (missing file means defaults).
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Install a predefined program list instead of choosing interactively.
    #[arg(long, value_enum)]
    tier: Option<Tier>,
    /// Comma-separated programs to install. Takes precedence over `--tier`.
    #[arg(long, value_name = "LIST")]
    programs: Option<String>,
    /// Install with the native package manager instead of a playbook.
    #[arg(long)]
    direct: bool,
    /// Do not install pip, Ansible, Homebrew or Chocolatey.
    #[arg(long)]
    skip_bootstrap: bool,
    /// Write the default config to `--config` and exit.
    #[arg(long)]
    init_config: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    if cli.init_config {
        write_config(&cli.config, &InstallerConfig::default())
            .with_context(|| format!("write {}", cli.config.display()))?;
        println!("Wrote default config to {}", cli.config.display());
        return Ok(exit_codes::OK);
    }

    let mut cfg = load_config(&cli.config)?;
    let platform = detect_platform()?;
    let credentials = Credentials::from_env(&cfg.completion)?;
    let limits = cfg.process.limits();
    let direct = cli.direct || !platform.supports_ansible_control();
    debug!(%platform, direct, "starting");

    // Reader threads mirror child output to stdout, so never hold its lock.
    let mut out = io::stdout();
    let mut path = SearchPath::from_env();
    if !cli.skip_bootstrap {
        let bootstrap = Bootstrap::from_env(&cfg.bootstrap.python, limits);
        path = if direct {
            bootstrap_package_manager(&bootstrap, platform, &path, &mut out)?
        } else {
            bootstrap_ansible(&bootstrap, platform, &path, &mut out)?
        };
    }
    if !platform.supports_ansible_control() && !cli.direct {
        writeln!(
            out,
            "Ansible does not support {platform} as a control machine natively. Installing programs directly instead."
        )?;
    }

    let stdin = io::stdin();
    let programs = select_programs(
        cli.tier,
        cli.programs.as_deref(),
        platform,
        cfg.programs,
        &mut stdin.lock(),
        &mut out,
    )?;
    if programs.is_empty() {
        writeln!(out, "No programs specified.")?;
        return Ok(exit_codes::INVALID);
    }

    if direct {
        let manager = PackageManager::detect(platform, &path)
            .ok_or_else(|| anyhow!("No supported package manager found on {platform}"))?;
        return Ok(direct_install(manager, &programs, &path, limits, &mut out)?.exit_code());
    }

    if let Some(found) = path.find(&cfg.playbook.command) {
        cfg.playbook.command = found.display().to_string();
    }
    let client = ProviderRouter::from_config(&cfg.completion, &credentials);
    let playbook = AnsiblePlaybook::from_config(&cfg.playbook, cli.inventory.as_deref(), limits);
    let request = RunRequest::from_config(&cfg, programs)?;

    writeln!(out, "Generating Ansible playbook...")?;
    let outcome = run_pipeline(
        &request,
        &RunDeps {
            client: &client,
            checker: &playbook,
            runner: &playbook,
            sleeper: &ThreadSleeper,
        },
        |event| println!("{event}"),
    )?;
    debug!(?outcome, "pipeline finished");
    Ok(outcome.exit_code())
}

fn bootstrap_ansible(
    bootstrap: &Bootstrap,
    platform: Platform,
    path: &SearchPath,
    out: &mut dyn Write,
) -> Result<SearchPath> {
    bootstrap.ensure_pip(out)?;
    let path = bootstrap.ensure_ansible(platform, path, out)?;
    writeln!(out, "\nInstallation complete. You can now use Ansible.")?;
    writeln!(
        out,
        "Note: Ansible requires Python 3.5+ and may need additional system dependencies like SSH on Linux."
    )?;
    Ok(path)
}

fn bootstrap_package_manager(
    bootstrap: &Bootstrap,
    platform: Platform,
    path: &SearchPath,
    out: &mut dyn Write,
) -> Result<SearchPath> {
    match platform {
        Platform::Windows if !path.has("choco") => {
            bootstrap.install_chocolatey(&chocolatey_dir(), path, out)
        }
        Platform::Darwin if !path.has("brew") => bootstrap.install_homebrew(path, out),
        _ => Ok(path.clone()),
    }
}
