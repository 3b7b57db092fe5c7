//! LLM-assisted workstation installer.
//!
//! Turns a list of program names into an Ansible playbook by asking a
//! completion endpoint, checks it with `ansible-playbook --syntax-check`,
//! feeds failures back for repair, then runs it. The crate keeps a strict
//! split:
//!
//! - **[`core`]**: Pure, deterministic logic (prompts, fences, backoff,
//!   catalogs, events). No I/O.
//! - **[`io`]**: Side-effecting operations (HTTP, filesystem, processes,
//!   sleeping) behind traits so tests can script them.
//!
//! Orchestration modules ([`generate`], [`repair`], [`run`], [`select`])
//! combine the two to implement the CLI.

pub mod core;
pub mod exit_codes;
pub mod generate;
pub mod io;
pub mod logging;
pub mod repair;
pub mod run;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
