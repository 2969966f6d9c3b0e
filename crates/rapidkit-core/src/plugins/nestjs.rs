use super::FrameworkPlugin;
use crate::render::case;
use std::process::Command;

/// NestJS (TypeScript) variant
#[derive(Debug, Clone, Copy, Default)]
pub struct NestJsPlugin;

impl FrameworkPlugin for NestJsPlugin {
    fn name(&self) -> &str {
        "nestjs"
    }

    fn language(&self) -> &str {
        "typescript"
    }

    fn display_name(&self) -> &str {
        "NestJS"
    }

    fn integration_test_path(&self, module_snake: &str) -> String {
        let kebab = case::kebab(module_snake);
        format!("test/modules/{}/{}.integration.spec.ts", kebab, kebab)
    }

    fn validate_requirements(&self) -> Vec<String> {
        let has_runtime = ["node", "bun"].iter().any(|runtime| {
            Command::new(runtime)
                .arg("--version")
                .output()
                .is_ok_and(|o| o.status.success())
        });
        if has_runtime {
            Vec::new()
        } else {
            vec!["Node.js or Bun not found on PATH (install from https://nodejs.org)".to_string()]
        }
    }
}
