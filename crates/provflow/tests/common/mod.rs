use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A throwaway project directory isolated from the caller's environment
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("provflow.yaml"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `provflow` running inside the project with no inherited credentials
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("provflow").unwrap();
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env_remove("PROVFLOW_CONFIG")
            .env_remove("PROVFLOW_CODE")
            .env_remove("ENV_ALIYUN_ACCESS_KEY_ID")
            .env_remove("ENV_ALIYUN_ACCESS_KEY_SECRET")
            .env_remove("ENV_ALIYUN_REGION");
        cmd
    }
}
