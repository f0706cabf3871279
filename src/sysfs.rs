//! Small helpers for sysfs attribute files.
//!
//! Attributes are reopened on every access: sysfs files are seekable but
//! seeking back to zero and rereading does not refresh the value.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Read an attribute's full content
pub fn read_string(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

/// Read an attribute holding a single integer
pub fn read_int(path: &Path) -> io::Result<i64> {
    let content = read_string(path)?;
    content.trim().parse::<i64>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected an integer, found {:?}", content.trim()),
        )
    })
}

/// Write a bare value to an existing attribute; never creates files
pub fn write_value(path: &Path, value: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(value.as_bytes())?;
    file.flush()
}

/// Check that an attribute can be opened for reading and writing
pub fn is_writable(path: &Path) -> bool {
    OpenOptions::new().read(true).write(true).open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_int_trims_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unload_heads");
        fs::write(&path, "4500\n").unwrap();

        assert_eq!(read_int(&path).unwrap(), 4500);
    }

    #[test]
    fn test_read_int_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate");
        fs::write(&path, "fast\n").unwrap();

        let err = read_int(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_value_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protect");
        assert!(write_value(&path, "5").is_err());

        fs::write(&path, "0").unwrap();
        write_value(&path, "5").unwrap();
        assert_eq!(read_int(&path).unwrap(), 5);
        assert!(is_writable(&path));
    }
}
