/// Package version helpers.
pub struct VersionUtil;

impl VersionUtil {
    /// Whether `version` carries a prerelease label.
    ///
    /// Follows SemVer 2.0 / NuGet rules: build metadata after `+` is ignored,
    /// and a `-` followed by a non-empty label marks a prerelease
    /// (`1.0.0-beta`, `2.1.0-rc.1+sha.5114f85`).
    pub fn is_prerelease(version: &str) -> bool {
        let without_metadata = version.trim().split('+').next().unwrap_or_default();
        match without_metadata.split_once('-') {
            Some((release, label)) => !release.is_empty() && !label.is_empty(),
            None => false,
        }
    }
}
