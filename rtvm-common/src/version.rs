// rtvm-common/src/version.rs
//! Version id normalization and ordering.
//!
//! Version ids are opaque strings to the pipeline; ordering is only needed for
//! display, so it is lenient: numeric components compare numerically, a
//! pre-release (`rc1`, `beta2`) sorts before its final release.
use std::cmp::Ordering;

/// Keyword that asks for the newest stable release.
pub const LATEST: &str = "latest";

/// Trims the input and prepends `prefix` unless already present.
/// `latest` passes through unchanged.
pub fn normalize_version(input: &str, prefix: &str) -> String {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case(LATEST) {
        return LATEST.to_string();
    }
    if trimmed.starts_with(prefix) {
        trimmed.to_string()
    } else {
        format!("{prefix}{trimmed}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey {
    pub numbers: Vec<u64>,
    /// Text after the numeric part, e.g. `rc1`. Empty for final releases.
    pub suffix: String,
}

impl VersionKey {
    pub fn parse(version: &str, prefix: &str) -> Self {
        let rest = version.strip_prefix(prefix).unwrap_or(version);
        let numeric_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (numeric, suffix) = rest.split_at(numeric_len);
        let numbers = numeric
            .split('.')
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.parse::<u64>().ok())
            .collect();
        Self {
            numbers,
            suffix: suffix.to_string(),
        }
    }

    pub fn minor(&self) -> u64 {
        self.numbers.get(1).copied().unwrap_or(0)
    }

    pub fn is_prerelease(&self) -> bool {
        !self.suffix.is_empty()
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        match (self.is_prerelease(), other.is_prerelease()) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            _ => self
                .suffix
                .cmp(&other.suffix)
                .then(self.numbers.len().cmp(&other.numbers.len())),
        }
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders two version ids sharing `prefix`, oldest first.
pub fn compare_versions(a: &str, b: &str, prefix: &str) -> Ordering {
    VersionKey::parse(a, prefix)
        .cmp(&VersionKey::parse(b, prefix))
        .then_with(|| a.cmp(b))
}
