use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use droidwall_config::constants::execution;
use tempfile::TempPath;

use crate::executor::ScriptError;

/// A script body written to its own executable temporary file.
///
/// Every call gets a unique path, so concurrent executions never share a
/// script file. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct ScriptFile {
    path: TempPath,
}

impl ScriptFile {
    /// Write `body` into a fresh file under `dir` and mark it executable.
    pub fn materialize(dir: &Path, body: &str) -> Result<Self, ScriptError> {
        fs::create_dir_all(dir).map_err(|source| ScriptError::Prepare {
            dir: dir.to_path_buf(),
            source,
        })?;

        let mut file = tempfile::Builder::new()
            .prefix(execution::SCRIPT_FILE_PREFIX)
            .suffix(execution::SCRIPT_FILE_SUFFIX)
            .tempfile_in(dir)
            .map_err(|source| ScriptError::Prepare {
                dir: dir.to_path_buf(),
                source,
            })?;

        let contents = render_script(interpreter(), body);
        file.write_all(contents.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ScriptError::Write {
                path: file.path().to_path_buf(),
                source,
            })?;

        // Close the write handle before anything executes the file.
        let path = file.into_temp_path();
        mark_executable(&path)?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn interpreter() -> Option<&'static str> {
    execution::INTERPRETER_CANDIDATES
        .iter()
        .copied()
        .find(|candidate| Path::new(candidate).exists())
}

/// Final file contents: interpreter line, body, and a closing `exit` so the
/// script reports the status of its last command.
pub fn render_script(interpreter: Option<&str>, body: &str) -> String {
    let mut contents = String::with_capacity(body.len() + 32);
    if let Some(interpreter) = interpreter {
        contents.push_str("#!");
        contents.push_str(interpreter);
        contents.push('\n');
    }
    contents.push_str(body);
    if !body.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str("exit\n");
    contents
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), ScriptError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        ScriptError::Permissions {
            path: PathBuf::from(path),
            source,
        }
    })
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), ScriptError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;

    #[test]
    fn render_appends_newline_and_exit() {
        assert_eq!(
            render_script(Some("/bin/sh"), "echo hi"),
            "#!/bin/sh\necho hi\nexit\n"
        );
        assert_eq!(render_script(None, "echo hi\n"), "echo hi\nexit\n");
    }

    #[test]
    fn materialized_files_are_unique_and_removed_on_drop() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = TempDir::new()?;
        let first = ScriptFile::materialize(dir.path(), "echo one")?;
        let second = ScriptFile::materialize(dir.path(), "echo two")?;
        assert_ne!(first.path(), second.path());

        let body = fs::read_to_string(first.path())?;
        assert!(body.contains("echo one\nexit\n"));

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn materialized_file_is_executable() -> Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let script = ScriptFile::materialize(dir.path(), "exit 0")?;
        let mode = fs::metadata(script.path())?.permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
        Ok(())
    }

    #[test]
    fn creates_missing_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let nested = dir.path().join("cache").join("scripts");
        let script = ScriptFile::materialize(&nested, "exit 0")?;
        assert!(script.path().starts_with(&nested));
        Ok(())
    }
}
