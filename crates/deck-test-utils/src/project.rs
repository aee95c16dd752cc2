//! [`TestProject`] temporary project directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory standing in for a project using decksync
///
/// Holds an isolated global config directory and audit directory so tests
/// never touch the real user settings.
///
/// ```rust,no_run
/// use deck_test_utils::TestProject;
///
/// let project = TestProject::new();
/// project.write_config("[gateway]\nurl = \"http://localhost:8001\"\n");
/// assert!(project.root().join("deck.toml").is_file());
/// ```
pub struct TestProject {
    temp_dir: TempDir,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("global")).unwrap();
        Self { temp_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory to use in place of `<config_dir>/decksync`
    pub fn global_config_dir(&self) -> PathBuf {
        self.root().join("global")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.root().join("audit")
    }

    /// Write `deck.toml`
    pub fn write_config(&self, content: &str) {
        self.write_file("deck.toml", content);
    }

    /// Write `deck.local.toml`
    pub fn write_local_config(&self, content: &str) {
        self.write_file("deck.local.toml", content);
    }

    /// Write the global `config.toml`
    pub fn write_global_config(&self, content: &str) {
        fs::write(self.global_config_dir().join("config.toml"), content).unwrap();
    }

    /// Write a file relative to the project root, creating parent directories
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).unwrap()
    }
}
