//! Shared fixtures for end-to-end tests

#![allow(dead_code)]

use rapidkit_core::fsutil;
use rapidkit_core::{EngineConfig, GenerateOptions, GenerateReport, ModuleGenerator};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const LOGGING: &str = "free/essentials/logging";
pub const FASTAPI: &str = "fastapi/standard";

pub const MAIN_PY: &str =
    "from fastapi import FastAPI\n\n# <<<inject:startup>>>\n\napp = FastAPI()\n";
pub const ENV_EXAMPLE: &str = "APP_NAME=demo\n# <<<inject:logging>>>\n";

/// A copy of the bundled modules plus an initialized project
pub struct Project {
    pub modules: TempDir,
    pub root: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let modules = TempDir::new().unwrap();
        copy_tree(&bundled_modules(), modules.path());
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("src")).unwrap();
        fs::write(root.path().join("src/main.py"), MAIN_PY).unwrap();
        fs::write(root.path().join(".env.example"), ENV_EXAMPLE).unwrap();
        Self { modules, root }
    }

    pub fn generator(&self) -> ModuleGenerator {
        ModuleGenerator::new(self.modules.path(), EngineConfig::default().with_formatters(false))
    }

    pub fn add(&self, profile: &str) -> GenerateReport {
        self.generator()
            .generate(LOGGING, self.root.path(), &options(profile))
            .unwrap()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn module_dir(&self) -> PathBuf {
        self.modules.path().join(LOGGING)
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn write(&self, rel: &str, content: &str) {
        fs::write(self.path(rel), content).unwrap()
    }

    pub fn hash(&self, rel: &str) -> String {
        fsutil::sha256_hex(&fs::read(self.path(rel)).unwrap())
    }

    /// Every file of the project tree with its bytes
    pub fn tree(&self) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(self.root.path())
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = fsutil::relative_to(self.root.path(), e.path());
                (rel, fs::read(e.path()).unwrap())
            })
            .collect()
    }
}

pub fn options(profile: &str) -> GenerateOptions {
    GenerateOptions {
        profile: Some(profile.to_string()),
        ..GenerateOptions::default()
    }
}

pub fn bundled_modules() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../modules")
}

pub fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let rel = entry.path().strip_prefix(from).unwrap();
        if rel.file_name().is_some_and(|n| n == ".module_state.json") {
            continue;
        }
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).unwrap();
        } else {
            fs::copy(entry.path(), &dest).unwrap();
        }
    }
}
