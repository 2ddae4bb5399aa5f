use std::env;
use std::path::{Path, PathBuf};

const POSIX_SHELLS: &[&str] = &["bash", "zsh", "sh", "dash", "ksh"];

/// Holds information about the current system environment
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os_info: String,
    pub shell_path: PathBuf,
    pub working_dir: PathBuf,
}

impl SystemInfo {
    /// Detects the current system environment and returns a `SystemInfo` struct.
    pub fn new() -> Self {
        let os_info_val = os_info::get();
        let os_info = format!(
            "{} {} {}",
            os_info_val.os_type(),
            os_info_val.version(),
            os_info_val.bitness()
        );

        SystemInfo {
            os_info,
            shell_path: detect_shell(env::var("SHELL").ok().as_deref()),
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Built-in system prompt describing the host and the available tools.
    pub fn system_prompt(&self) -> String {
        SYSTEM_PROMPT
            .replace("{os_info}", &self.os_info)
            .replace("{shell}", &self.shell_path.display().to_string())
            .replace("{cwd}", &self.working_dir.display().to_string())
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::new()
    }
}

fn is_posix_shell(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| POSIX_SHELLS.contains(&name.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// The user's login shell when it speaks POSIX `$?`, otherwise bash or sh.
fn detect_shell(login_shell: Option<&str>) -> PathBuf {
    if let Some(shell) = login_shell.map(PathBuf::from) {
        if is_posix_shell(&shell) && shell.exists() {
            return shell;
        }
    }
    let bash = PathBuf::from("/bin/bash");
    if bash.exists() {
        bash
    } else {
        PathBuf::from("/bin/sh")
    }
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant working on the user's machine. \
The OS is {os_info}, the shell is {shell} and the working directory is {cwd}.\n\
You can run shell commands with the `bash` tool; the shell session persists between calls, so \
directory changes and environment variables carry over. Avoid interactive commands and commands \
that do not terminate.\n\
You can inspect and modify files with the `str_replace_editor` tool. Prefer `view` before editing, \
make `old_str` unique when using `str_replace`, and never use `create` on a file that already exists.\n\
Keep answers concise and report what you changed.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_posix_login_shells_fall_back() {
        let shell = detect_shell(Some("/usr/bin/fish"));
        assert!(shell == Path::new("/bin/bash") || shell == Path::new("/bin/sh"));
    }

    #[test]
    fn posix_names_are_recognised() {
        assert!(is_posix_shell(Path::new("/usr/local/bin/zsh")));
        assert!(is_posix_shell(Path::new("/bin/sh")));
        assert!(!is_posix_shell(Path::new("/usr/bin/fish")));
        assert!(!is_posix_shell(Path::new("powershell.exe")));
    }

    #[test]
    fn prompt_mentions_host_details() {
        let info = SystemInfo {
            os_info: "Linux 6.1 64-bit".to_string(),
            shell_path: PathBuf::from("/bin/bash"),
            working_dir: PathBuf::from("/work"),
        };
        let prompt = info.system_prompt();
        assert!(prompt.contains("Linux 6.1 64-bit"));
        assert!(prompt.contains("/bin/bash"));
        assert!(prompt.contains("/work"));
    }
}
