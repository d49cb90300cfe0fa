//! Artifact output: rendered stubs and the success touch file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use stubsmith_types::is_stdout_path;

/// Writes a result string to its destination. `None` or `-` means
/// standard output. Parent directories are created as needed.
pub fn write_artifact(text: &str, output: Option<&Path>) -> io::Result<()> {
    match output {
        Some(path) if !is_stdout_path(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, text)
        }
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()
        }
    }
}

/// Creates the file if absent and bumps its modification time. External
/// build tooling polls the mtime to detect the last clean run.
pub fn touch(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_lands_at_the_given_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out/mod.pyi");
        write_artifact("def f() -> None: ...\n", Some(&path)).expect("write artifact");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read back"),
            "def f() -> None: ...\n"
        );
    }

    #[test]
    fn touch_creates_and_then_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ok.stamp");

        touch(&path).expect("first touch");
        assert!(path.exists());
        let first = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .expect("mtime");

        std::thread::sleep(std::time::Duration::from_millis(20));
        touch(&path).expect("second touch");
        let second = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .expect("mtime");
        assert!(second > first);
    }

    #[test]
    fn touch_does_not_truncate_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ok.stamp");
        std::fs::write(&path, "payload").expect("seed file");
        touch(&path).expect("touch");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "payload");
    }
}
