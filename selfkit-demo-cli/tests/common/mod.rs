//! Common test utilities for selfkit-demo-cli integration tests

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// A fixed storage key so identities survive between invocations.
pub const STORAGE_KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";

/// Temporary storage for one test.
pub struct TestContext {
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Run the binary against this context's storage without a storage key.
    pub fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("Failed to execute command")
    }

    /// Run the binary with [`STORAGE_KEY`] configured.
    pub fn run_with_key(&self, args: &[&str]) -> Output {
        self.command(args)
            .env("SELFKIT_STORAGE_KEY", STORAGE_KEY)
            .output()
            .expect("Failed to execute command")
    }

    /// Run the binary with extra environment variables.
    pub fn run_with_env(&self, args: &[&str], vars: &[(&str, &str)]) -> Output {
        let mut command = self.command(args);
        command.envs(vars.iter().copied());
        command.output().expect("Failed to execute command")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_selfkit-demo"));
        command
            .args(args)
            .env("SELFKIT_DEMO_DIR", self.storage_dir())
            .env_remove("SELFKIT_STORAGE_KEY")
            .env_remove("SELFKIT_ROUND_TIMEOUT_SECS")
            .env_remove("SELFKIT_ENVIRONMENT")
            .env("RUST_LOG", "off");
        command
    }
}

/// Stdout and stderr of `output`, for assertions and failure messages.
pub fn combined(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}
