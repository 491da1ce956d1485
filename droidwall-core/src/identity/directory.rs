use std::fs;
use std::path::{Path, PathBuf};

use droidwall_config::constants::uids;
use tracing::debug;

use crate::error::DirectoryError;
use crate::rules::OwnerId;

/// One installed package as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledUnit {
    pub package: String,
    pub uid: OwnerId,
    pub has_network_permission: bool,
}

/// Installed-application directory.
pub trait AppDirectory: Send + Sync {
    fn installed_units(&self) -> Result<Vec<InstalledUnit>, DirectoryError>;

    /// Display label for `unit`. Called only on a label-cache miss.
    fn load_label(&self, unit: &InstalledUnit) -> String {
        unit.package.clone()
    }
}

/// Directory read from the package manager's `packages.list`.
///
/// Each line is `<package> <uid> <debuggable> <data dir> [<seinfo> <gids>]`;
/// network permission is membership of the inet group in `<gids>`.
#[derive(Debug, Clone)]
pub struct PackagesList {
    path: PathBuf,
}

impl PackagesList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(contents: &str) -> Vec<InstalledUnit> {
        contents.lines().filter_map(parse_line).collect()
    }
}

impl AppDirectory for PackagesList {
    fn installed_units(&self) -> Result<Vec<InstalledUnit>, DirectoryError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| DirectoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }
}

fn parse_line(line: &str) -> Option<InstalledUnit> {
    let mut fields = line.split_whitespace();
    let package = fields.next()?;
    let raw_uid = fields.next()?;
    let uid = match raw_uid.parse::<OwnerId>() {
        Ok(uid) => uid,
        Err(err) => {
            debug!(package, raw_uid, error = %err, "skipping package with malformed uid");
            return None;
        }
    };
    // debuggable, data dir, seinfo
    let gids = fields.nth(3).unwrap_or("none");
    let has_network_permission = gids
        .split(',')
        .filter_map(|gid| gid.trim().parse::<u32>().ok())
        .any(|gid| gid == uids::INET_GID);

    Some(InstalledUnit {
        package: package.to_string(),
        uid,
        has_network_permission,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    const SAMPLE: &str = "\
com.android.browser 10005 0 /data/data/com.android.browser default 3003,1015
com.example.offline 10020 0 /data/data/com.example.offline default none
com.example.legacy 10021 0 /data/data/com.example.legacy
broken-line
com.example.bad notanumber 0 /data/data/x default 3003
";

    #[test]
    fn parses_permission_from_inet_gid() {
        let units = PackagesList::parse(SAMPLE);
        assert_eq!(units.len(), 3);
        assert_eq!(
            units.first(),
            Some(&InstalledUnit {
                package: "com.android.browser".to_string(),
                uid: 10005,
                has_network_permission: true,
            })
        );
        assert!(units.iter().skip(1).all(|unit| !unit.has_network_permission));
    }

    #[test]
    fn reads_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let file = dir.child("packages.list");
        file.write_str(SAMPLE)?;

        let directory = PackagesList::new(file.path());
        let units = directory.installed_units()?;
        assert_eq!(units.len(), 3);
        assert_eq!(
            units.first().map(|unit| directory.load_label(unit)),
            Some("com.android.browser".to_string())
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let directory = PackagesList::new("/nonexistent/packages.list");
        assert!(matches!(
            directory.installed_units(),
            Err(DirectoryError::Read { .. })
        ));
    }
}
