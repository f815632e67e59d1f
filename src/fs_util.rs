use std::fs;
use std::io::Write;

use camino::Utf8Path;
use regex::Regex;

use crate::error::MasstError;

/// Create the parent directories of `path`. Existing directories are fine, so
/// concurrent jobs writing into the same output folder never race here.
pub fn ensure_parent(path: &Utf8Path) -> Result<(), MasstError> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| MasstError::Filesystem(format!("create {parent}: {err}")))?;
        }
    }
    Ok(())
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), MasstError> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".masst-tree")
        .tempfile_in(dir.as_std_path())
        .map_err(|err| MasstError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| MasstError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| MasstError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}

pub fn write_string_atomic(path: &Utf8Path, content: &str) -> Result<(), MasstError> {
    write_bytes_atomic(path, content.as_bytes())
}

/// Replace everything that is not safe in a file name with `_`.
pub fn path_safe(name: &str) -> String {
    let re = Regex::new(r"[^-a-zA-Z0-9_.() ]+").unwrap();
    re.replace_all(name, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn path_safe_replaces_runs() {
        assert_eq!(path_safe("caffeic acid (1)"), "caffeic acid (1)");
        assert_eq!(path_safe("a/b:c//d"), "a_b_c_d");
    }

    #[test]
    fn atomic_write_creates_parents_and_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let target = root.join("nested/deeper/out.json");
        write_string_atomic(&target, "first").unwrap();
        write_string_atomic(&target, "second").unwrap();
        assert_eq!(std::fs::read_to_string(target.as_std_path()).unwrap(), "second");
        ensure_parent(&target).unwrap();
    }
}
