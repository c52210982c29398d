// rtvm-core/src/shell.rs
//! Search-path integration: a single marked block in the user's shell
//! startup file, or an environment script plus profile hook on Windows.
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rtvm_common::config::Config;
use rtvm_common::error::{Result, RtvmError};
use tracing::{debug, warn};

use crate::fs::atomic_write_file;

pub const BLOCK_START: &str = "# >>> rtvm >>>";
pub const BLOCK_END: &str = "# <<< rtvm <<<";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
}

impl ShellKind {
    /// Picks the shell from a `$SHELL`-style path such as `/usr/bin/zsh`.
    pub fn from_shell_path(shell: &str) -> Option<Self> {
        let name = Path::new(shell.trim()).file_name()?.to_str()?;
        match name {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            _ => None,
        }
    }

    pub fn detect() -> Option<Self> {
        env::var("SHELL")
            .ok()
            .and_then(|shell| Self::from_shell_path(&shell))
    }

    pub fn rc_file(&self, home: &Path) -> PathBuf {
        match self {
            Self::Bash => {
                let bashrc = home.join(".bashrc");
                if bashrc.exists() {
                    bashrc
                } else {
                    home.join(".bash_profile")
                }
            }
            Self::Zsh => home.join(".zshrc"),
            Self::Fish => home.join(".config").join("fish").join("config.fish"),
        }
    }

    pub fn path_block(&self, shim_dir: &Path) -> String {
        let dir = shim_dir.display();
        let body = match self {
            Self::Bash | Self::Zsh => format!(
                "case \":$PATH:\" in\n  *\":{dir}:\"*) ;;\n  *) export PATH=\"{dir}:$PATH\" ;;\nesac\n"
            ),
            Self::Fish => format!(
                "if not contains \"{dir}\" $PATH\n    set -gx PATH \"{dir}\" $PATH\nend\n"
            ),
        };
        format!("{BLOCK_START}\n{body}{BLOCK_END}\n")
    }
}

/// Replaces the marked block in `content` with `block`, or appends it when no
/// complete block is present. Text outside the markers is preserved.
pub fn rewrite_marked_block(content: &str, block: &str) -> String {
    if let Some(start) = content.find(BLOCK_START) {
        if let Some(end_rel) = content[start..].find(BLOCK_END) {
            let mut end = start + end_rel + BLOCK_END.len();
            if content[end..].starts_with("\r\n") {
                end += 2;
            } else if content[end..].starts_with('\n') {
                end += 1;
            }
            return format!("{}{}{}", &content[..start], block, &content[end..]);
        }
    }

    let mut updated = content.to_string();
    if !updated.is_empty() {
        if !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push('\n');
    }
    updated.push_str(block);
    updated
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathUpdate {
    Unchanged(PathBuf),
    Updated(PathBuf),
    Unsupported,
}

/// Ensures the shim directory is on the search path for future shells.
pub fn ensure_on_path(config: &Config) -> Result<PathUpdate> {
    let home = config.home_dir();
    if cfg!(windows) {
        return ensure_powershell_hook(config, &home);
    }
    match ShellKind::detect() {
        Some(shell) => ensure_in_rc_file(shell, &home, &config.shim_dir()),
        None => {
            warn!(
                "Could not detect a supported shell from $SHELL; add {} to your PATH manually",
                config.shim_dir().display()
            );
            Ok(PathUpdate::Unsupported)
        }
    }
}

pub fn ensure_in_rc_file(shell: ShellKind, home: &Path, shim_dir: &Path) -> Result<PathUpdate> {
    let rc_file = shell.rc_file(home);
    write_block(&rc_file, &shell.path_block(shim_dir))
}

fn write_block(file: &Path, block: &str) -> Result<PathUpdate> {
    let current = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(RtvmError::IoError(format!(
                "Failed to read {}: {}",
                file.display(),
                e
            )))
        }
    };
    let updated = rewrite_marked_block(&current, block);
    if updated == current {
        debug!("PATH block in {} already current", file.display());
        return Ok(PathUpdate::Unchanged(file.to_path_buf()));
    }
    atomic_write_file(file, updated.as_bytes())?;
    debug!("Updated PATH block in {}", file.display());
    Ok(PathUpdate::Updated(file.to_path_buf()))
}

pub fn powershell_env_script(shim_dir: &Path) -> String {
    let dir = shim_dir.display();
    format!(
        "if (-not (($env:PATH -split ';') -contains '{dir}')) {{\r\n    $env:PATH = '{dir};' + $env:PATH\r\n}}\r\n"
    )
}

pub fn powershell_profile(home: &Path) -> PathBuf {
    home.join("Documents")
        .join("PowerShell")
        .join("Microsoft.PowerShell_profile.ps1")
}

/// Writes `env.ps1` under the rtvm root and hooks it into the PowerShell
/// profile once.
pub fn ensure_powershell_hook(config: &Config, home: &Path) -> Result<PathUpdate> {
    let env_script = config.env_script_path();
    let script = powershell_env_script(&config.shim_dir());
    let script_changed = fs::read_to_string(&env_script).ok().as_deref() != Some(script.as_str());
    if script_changed {
        atomic_write_file(&env_script, script.as_bytes())?;
    }

    let hook = format!(
        "{BLOCK_START}\r\n. '{}'\r\n{BLOCK_END}\r\n",
        env_script.display()
    );
    match write_block(&powershell_profile(home), &hook)? {
        PathUpdate::Unchanged(path) if script_changed => Ok(PathUpdate::Updated(path)),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_shell_from_path() {
        assert_eq!(ShellKind::from_shell_path("/bin/bash"), Some(ShellKind::Bash));
        assert_eq!(ShellKind::from_shell_path("/usr/local/bin/zsh"), Some(ShellKind::Zsh));
        assert_eq!(ShellKind::from_shell_path("/usr/bin/fish"), Some(ShellKind::Fish));
        assert_eq!(ShellKind::from_shell_path("/bin/tcsh"), None);
        assert_eq!(ShellKind::from_shell_path(""), None);
    }

    #[test]
    fn bash_prefers_bashrc_when_present() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(
            ShellKind::Bash.rc_file(home.path()),
            home.path().join(".bash_profile")
        );
        fs::write(home.path().join(".bashrc"), "").unwrap();
        assert_eq!(ShellKind::Bash.rc_file(home.path()), home.path().join(".bashrc"));
    }

    #[test]
    fn block_is_appended_once_and_replaced_in_place() {
        let block_a = ShellKind::Zsh.path_block(Path::new("/home/u/.rtvm/shims"));
        let original = "alias ll='ls -l'\nexport EDITOR=vim";
        let once = rewrite_marked_block(original, &block_a);
        assert!(once.starts_with("alias ll='ls -l'\nexport EDITOR=vim\n\n"));
        assert_eq!(rewrite_marked_block(&once, &block_a), once);

        let block_b = ShellKind::Zsh.path_block(Path::new("/opt/rtvm/shims"));
        let replaced = rewrite_marked_block(&once, &block_b);
        assert_eq!(replaced.matches(BLOCK_START).count(), 1);
        assert!(replaced.contains("/opt/rtvm/shims"));
        assert!(!replaced.contains("/home/u/.rtvm/shims"));
        assert!(replaced.starts_with("alias ll='ls -l'"));
    }

    #[test]
    fn text_after_block_is_preserved() {
        let block = ShellKind::Bash.path_block(Path::new("/s"));
        let content = format!("before\n{BLOCK_START}\nold stuff\n{BLOCK_END}\nafter\n");
        let updated = rewrite_marked_block(&content, &block);
        assert_eq!(updated, format!("before\n{block}after\n"));
    }

    #[test]
    fn rc_file_is_untouched_when_block_current() {
        let home = tempfile::tempdir().unwrap();
        let shims = Path::new("/home/u/.rtvm/shims");
        let first = ensure_in_rc_file(ShellKind::Fish, home.path(), shims).unwrap();
        let rc = home.path().join(".config/fish/config.fish");
        assert_eq!(first, PathUpdate::Updated(rc.clone()));
        assert!(fs::read_to_string(&rc).unwrap().contains("set -gx PATH"));

        let second = ensure_in_rc_file(ShellKind::Fish, home.path(), shims).unwrap();
        assert_eq!(second, PathUpdate::Unchanged(rc));
    }

    #[test]
    fn powershell_hook_writes_env_script_and_profile() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());

        let first = ensure_powershell_hook(&config, home.path()).unwrap();
        assert!(matches!(first, PathUpdate::Updated(_)));
        let script = fs::read_to_string(config.env_script_path()).unwrap();
        assert!(script.contains(&config.shim_dir().display().to_string()));
        let profile = fs::read_to_string(powershell_profile(home.path())).unwrap();
        assert!(profile.contains(&config.env_script_path().display().to_string()));

        let second = ensure_powershell_hook(&config, home.path()).unwrap();
        assert!(matches!(second, PathUpdate::Unchanged(_)));
    }
}
