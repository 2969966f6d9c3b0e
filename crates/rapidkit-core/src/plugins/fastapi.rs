use super::FrameworkPlugin;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// FastAPI (Python) variant
#[derive(Debug, Clone, Copy, Default)]
pub struct FastApiPlugin;

impl FrameworkPlugin for FastApiPlugin {
    fn name(&self) -> &str {
        "fastapi"
    }

    fn language(&self) -> &str {
        "python"
    }

    fn display_name(&self) -> &str {
        "FastAPI"
    }

    fn integration_test_path(&self, module_snake: &str) -> String {
        format!(
            "tests/modules/integration/{}/test_{}_integration.py",
            module_snake, module_snake
        )
    }

    fn validate_requirements(&self) -> Vec<String> {
        let available = Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success());
        if available {
            Vec::new()
        } else {
            vec!["Python 3 not found on PATH (install from https://python.org)".to_string()]
        }
    }

    /// Every directory that received a `.py` file becomes a package
    fn post_generation_hook(&self, target_dir: &Path, written: &[PathBuf]) -> Result<()> {
        for file in written {
            if file.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let mut dir = file.parent();
            while let Some(current) = dir {
                if current == target_dir || !current.starts_with(target_dir) {
                    break;
                }
                let init = current.join("__init__.py");
                if !init.exists() {
                    std::fs::write(&init, b"").map_err(|e| Error::io(&init, e))?;
                    tracing::debug!(path = %init.display(), "created package marker");
                }
                dir = current.parent();
            }
        }
        Ok(())
    }
}
