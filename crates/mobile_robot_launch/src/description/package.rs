//! Package share directory lookup
//!
//! The resolver never consults process-wide state directly. Callers hand it a
//! [`PackageLocator`], usually an [`AmentIndex`] built once at the CLI edge.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Maps a logical package name to its installed share directory
pub trait PackageLocator {
    /// Share directory of `package`, or `None` if it is not installed
    fn share_dir(&self, package: &str) -> Option<PathBuf>;
}

impl<F> PackageLocator for F
where
    F: Fn(&str) -> Option<PathBuf>,
{
    fn share_dir(&self, package: &str) -> Option<PathBuf> {
        self(package)
    }
}

/// Package names are single path components
fn is_valid_package_name(package: &str) -> bool {
    !package.is_empty()
        && package != "."
        && package != ".."
        && !package.contains(['/', '\\'])
}

/// Lookup over ament install prefixes (`<prefix>/share/<package>`)
#[derive(Debug, Clone, Default)]
pub struct AmentIndex {
    prefixes: Vec<PathBuf>,
}

impl AmentIndex {
    /// Index over explicit install prefixes, searched in order
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Index over the prefixes listed in `AMENT_PREFIX_PATH`
    pub fn from_env() -> Self {
        let prefixes = std::env::var_os("AMENT_PREFIX_PATH")
            .map(|value| std::env::split_paths(&value).collect())
            .unwrap_or_default();
        Self { prefixes }
    }

    fn registered(prefix: &Path, package: &str) -> bool {
        prefix
            .join("share/ament_index/resource_index/packages")
            .join(package)
            .is_file()
    }
}

impl PackageLocator for AmentIndex {
    fn share_dir(&self, package: &str) -> Option<PathBuf> {
        if !is_valid_package_name(package) {
            return None;
        }

        // Registered packages win over bare share directories
        let registered = self.prefixes.iter().find_map(|prefix| {
            let share = prefix.join("share").join(package);
            (Self::registered(prefix, package) && share.is_dir()).then_some(share)
        });

        registered.or_else(|| {
            self.prefixes
                .iter()
                .map(|prefix| prefix.join("share").join(package))
                .find(|share| share.is_dir())
        })
    }
}

/// Explicit package name to share directory map
#[derive(Debug, Clone, Default)]
pub struct PackageMap {
    packages: IndexMap<String, PathBuf>,
}

impl PackageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package
    pub fn with_package(mut self, name: impl Into<String>, share_dir: impl Into<PathBuf>) -> Self {
        self.insert(name, share_dir);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, share_dir: impl Into<PathBuf>) {
        self.packages.insert(name.into(), share_dir.into());
    }
}

impl PackageLocator for PackageMap {
    fn share_dir(&self, package: &str) -> Option<PathBuf> {
        self.packages.get(package).cloned()
    }
}

/// Tries each locator in order, first hit wins
#[derive(Default)]
pub struct LayeredLocator {
    layers: Vec<Box<dyn PackageLocator>>,
}

impl LayeredLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer (searched after the existing ones)
    pub fn with_layer(mut self, locator: impl PackageLocator + 'static) -> Self {
        self.layers.push(Box::new(locator));
        self
    }
}

impl PackageLocator for LayeredLocator {
    fn share_dir(&self, package: &str) -> Option<PathBuf> {
        self.layers
            .iter()
            .find_map(|locator| locator.share_dir(package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_ament_index_prefers_registered_packages() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        // Unregistered share dir in the first prefix
        fs::create_dir_all(first.path().join("share/mobile_robot")).unwrap();

        // Registered package in the second prefix
        fs::create_dir_all(second.path().join("share/mobile_robot")).unwrap();
        let marker_dir = second
            .path()
            .join("share/ament_index/resource_index/packages");
        fs::create_dir_all(&marker_dir).unwrap();
        fs::write(marker_dir.join("mobile_robot"), "").unwrap();

        let index = AmentIndex::new([first.path(), second.path()]);
        assert_eq!(
            index.share_dir("mobile_robot"),
            Some(second.path().join("share/mobile_robot"))
        );
    }

    #[test]
    fn test_ament_index_falls_back_to_share_dir() {
        let prefix = tempfile::tempdir().unwrap();
        fs::create_dir_all(prefix.path().join("share/ros_gz_sim")).unwrap();

        let index = AmentIndex::new([prefix.path()]);
        assert_eq!(
            index.share_dir("ros_gz_sim"),
            Some(prefix.path().join("share/ros_gz_sim"))
        );
        assert_eq!(index.share_dir("missing"), None);
    }

    #[test]
    fn test_ament_index_rejects_path_like_names() {
        let prefix = tempfile::tempdir().unwrap();
        fs::create_dir_all(prefix.path().join("share")).unwrap();

        let index = AmentIndex::new([prefix.path()]);
        assert_eq!(index.share_dir(".."), None);
        assert_eq!(index.share_dir("a/b"), None);
        assert_eq!(index.share_dir(""), None);
    }

    #[test]
    fn test_layered_locator_order() {
        let overrides = PackageMap::new().with_package("mobile_robot", "/tmp/override");
        let fallback = |name: &str| Some(PathBuf::from(format!("/opt/share/{}", name)));
        let locator = LayeredLocator::new()
            .with_layer(overrides)
            .with_layer(fallback);

        assert_eq!(
            locator.share_dir("mobile_robot"),
            Some(PathBuf::from("/tmp/override"))
        );
        assert_eq!(
            locator.share_dir("ros_gz_sim"),
            Some(PathBuf::from("/opt/share/ros_gz_sim"))
        );
    }
}
