//! Engine launcher construction
//!
//! Panako is a Java application; it needs a couple of `--add-opens` flags and
//! the LMDB native library on `java.library.path`.

use crate::backend::EngineRequest;
use crate::error::EngineError;
use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(target_os = "macos")]
const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(target_os = "macos"))]
const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Candidate directories holding the LMDB shared library
pub fn default_library_paths() -> Vec<PathBuf> {
    let paths: &[&str] = if cfg!(target_os = "macos") {
        &["/opt/homebrew/lib", "/usr/local/lib"]
    } else {
        &[
            "/usr/lib",
            "/usr/local/lib",
            "/usr/lib/x86_64-linux-gnu",
            "/usr/lib/aarch64-linux-gnu",
        ]
    };
    paths.iter().map(PathBuf::from).collect()
}

/// Locate `panako-*-all.jar` under `<panako_dir>/build/libs`
pub fn find_jar(panako_dir: &Path) -> Option<PathBuf> {
    let libs = panako_dir.join("build").join("libs");
    let mut jars: Vec<PathBuf> = std::fs::read_dir(&libs)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("panako-") && name.ends_with("-all.jar"))
                .unwrap_or(false)
        })
        .collect();
    jars.sort();
    jars.pop()
}

/// Program plus leading arguments used to start the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    program: String,
    prefix: Vec<String>,
    env: Vec<(String, String)>,
}

impl EngineCommand {
    /// Launch an arbitrary program; request arguments are appended to `prefix`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.prefix.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Build the `java -jar panako-*-all.jar` launcher for a Panako checkout.
    pub fn java(
        java: &str,
        panako_dir: &Path,
        library_candidates: &[PathBuf],
    ) -> Result<Self, EngineError> {
        let jar = find_jar(panako_dir).ok_or_else(|| EngineError::JarNotFound {
            dir: panako_dir.join("build").join("libs"),
        })?;

        let existing: Vec<String> = library_candidates
            .iter()
            .filter(|path| path.is_dir())
            .map(|path| path.display().to_string())
            .collect();
        let library_path = if existing.is_empty() {
            "/usr/lib".to_string()
        } else {
            existing.join(":")
        };

        log::debug!("Using Panako jar {}", jar.display());

        let mut command = Self::new(java)
            .arg("--add-opens")
            .arg("java.base/java.nio=ALL-UNNAMED")
            .arg("--add-opens")
            .arg("java.base/sun.nio.ch=ALL-UNNAMED")
            .arg(format!("-Djava.library.path={}", library_path))
            .arg("-jar")
            .arg(jar.display().to_string());

        if !existing.is_empty() {
            let value = match std::env::var(LIBRARY_PATH_VAR) {
                Ok(current) if !current.is_empty() => format!("{}:{}", library_path, current),
                _ => library_path,
            };
            command = command.env(LIBRARY_PATH_VAR, value);
        }

        Ok(command)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument vector for `request`, excluding the program itself.
    pub fn arguments(&self, request: &EngineRequest) -> Vec<String> {
        let mut args = self.prefix.clone();
        args.extend(request.arguments());
        args
    }

    pub fn build(&self, request: &EngineRequest) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.arguments(request));
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::EngineOp;

    #[test]
    fn test_java_command_layout() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("build").join("libs");
        std::fs::create_dir_all(&libs).unwrap();
        std::fs::write(libs.join("panako-2.1-all.jar"), b"").unwrap();
        std::fs::write(libs.join("panako-2.1.jar"), b"").unwrap();

        let command = EngineCommand::java("java", dir.path(), &[dir.path().to_path_buf()]).unwrap();
        let request = EngineRequest::new(EngineOp::Query).with_target("/tmp/a.wav");
        let args = command.arguments(&request);

        assert_eq!(command.program(), "java");
        assert_eq!(args[0], "--add-opens");
        assert_eq!(
            args[4],
            format!("-Djava.library.path={}", dir.path().display())
        );
        assert_eq!(args[5], "-jar");
        assert!(args[6].ends_with("panako-2.1-all.jar"));
        assert_eq!(&args[7..], &["query".to_string(), "/tmp/a.wav".to_string()]);
    }

    #[test]
    fn test_missing_jar() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineCommand::java("java", dir.path(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::JarNotFound { .. }));
    }
}
