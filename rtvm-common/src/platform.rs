// rtvm-common/src/platform.rs
use std::env;
use std::fmt;

/// Operating system and architecture in the catalog's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self::from_rust_target(env::consts::OS, env::consts::ARCH)
    }

    pub fn from_rust_target(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "arm" => "armv6l",
            "powerpc64" => "ppc64",
            "s390x" => "s390x",
            other => other,
        };
        Self::new(os, arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rust_names_to_catalog_names() {
        assert_eq!(
            Platform::from_rust_target("macos", "aarch64"),
            Platform::new("darwin", "arm64")
        );
        assert_eq!(
            Platform::from_rust_target("linux", "x86_64").to_string(),
            "linux-amd64"
        );
        assert_eq!(Platform::from_rust_target("windows", "x86").arch, "386");
        assert_eq!(Platform::from_rust_target("freebsd", "riscv64").os, "freebsd");
    }
}
