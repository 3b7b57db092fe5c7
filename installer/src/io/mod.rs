pub mod artifact;
pub mod bootstrap;
pub mod completion;
pub mod config;
pub mod credentials;
pub mod platform;
pub mod playbook;
pub mod process;
pub mod sleeper;
