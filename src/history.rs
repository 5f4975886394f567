//! Shell history access for suggestion prompts.
//!
//! Reads the most recent commands from the user's shell history file so the
//! completion backend can see what the user has been doing. Each shell stores
//! history in its own format; we parse just enough of each to recover the
//! command text.

use std::path::PathBuf;

/// How many trailing commands to include in prompts.
pub const MAX_COMMANDS: usize = 5;

/// Placeholder snapshot when no history file can be read.
pub const NO_HISTORY: &str = "No shell history available.";

/// Return the last few shell commands as a newline-joined string, or
/// [`NO_HISTORY`] when nothing is readable.
pub fn shell_history(shell: &str) -> String {
    let shell = shell_name(shell);
    let Some(path) = history_file(shell) else {
        return NO_HISTORY.to_string();
    };
    let commands = read_last_commands(&path, shell, MAX_COMMANDS);
    if commands.is_empty() {
        NO_HISTORY.to_string()
    } else {
        commands.join("\n")
    }
}

/// Callers usually pass `$SHELL`, a full path like `/bin/zsh`; the format
/// dispatch wants the bare name.
fn shell_name(shell: &str) -> &str {
    std::path::Path::new(shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(shell)
}

fn history_file(shell: &str) -> Option<PathBuf> {
    if let Ok(histfile) = std::env::var("HISTFILE") {
        if !histfile.is_empty() {
            return Some(PathBuf::from(histfile));
        }
    }
    let home = dirs::home_dir()?;
    let path = match shell {
        "zsh" => home.join(".zsh_history"),
        "bash" => {
            let p = home.join(".bash_history");
            if p.exists() {
                p
            } else {
                home.join(".history")
            }
        }
        "fish" => home.join(".local/share/fish/fish_history"),
        _ => home.join(".history"),
    };
    Some(path)
}

fn read_last_commands(path: &std::path::Path, shell: &str, n: usize) -> Vec<String> {
    let shell = shell_name(shell);
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut commands = Vec::with_capacity(n);
    for line in contents.lines().rev() {
        if commands.len() >= n {
            break;
        }
        let Some(cmd) = parse_history_line(line, shell) else {
            continue;
        };
        if cmd.is_empty() || is_komplete_command(&cmd) {
            continue;
        }
        commands.push(cmd);
    }
    commands.reverse();
    commands
}

/// Extract the command text from one history line, or `None` when the line is
/// metadata rather than a command.
fn parse_history_line(line: &str, shell: &str) -> Option<String> {
    match shell {
        // zsh extended format: `: 1700000000:0;git status`
        "zsh" => {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix(": ") {
                let (_, cmd) = rest.split_once(';')?;
                Some(cmd.trim().to_string())
            } else {
                Some(trimmed.to_string())
            }
        }
        // fish YAML-ish format: commands appear as `- cmd: git status`
        "fish" => line
            .trim()
            .strip_prefix("- cmd: ")
            .map(|cmd| cmd.trim().to_string()),
        _ => Some(line.trim().to_string()),
    }
}

/// Our own invocations are noise in the prompt, skip them.
fn is_komplete_command(cmd: &str) -> bool {
    for prefix in ["komplete", "./k", "k"] {
        if cmd == prefix || cmd.starts_with(&format!("{prefix} ")) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_history(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn zsh_extended_format() {
        let f = write_history(": 1700000001:0;git status\n: 1700000002:0;cargo test\n");
        let cmds = read_last_commands(f.path(), "zsh", 5);
        assert_eq!(cmds, vec!["git status", "cargo test"]);
    }

    #[test]
    fn full_shell_path_uses_basename_format() {
        let f = write_history(": 1700000001:0;git status\n: 1700000002:0;cargo test\n");
        let cmds = read_last_commands(f.path(), "/bin/zsh", 5);
        assert_eq!(cmds, vec!["git status", "cargo test"]);
    }

    #[test]
    fn shell_name_strips_path() {
        assert_eq!(shell_name("/bin/zsh"), "zsh");
        assert_eq!(shell_name("/usr/local/bin/fish"), "fish");
        assert_eq!(shell_name("bash"), "bash");
    }

    #[test]
    fn zsh_plain_lines() {
        let f = write_history("ls -la\npwd\n");
        let cmds = read_last_commands(f.path(), "zsh", 5);
        assert_eq!(cmds, vec!["ls -la", "pwd"]);
    }

    #[test]
    fn fish_cmd_blocks() {
        let f = write_history("- cmd: git log\n  when: 1700000001\n- cmd: make build\n  when: 1700000002\n");
        let cmds = read_last_commands(f.path(), "fish", 5);
        assert_eq!(cmds, vec!["git log", "make build"]);
    }

    #[test]
    fn takes_most_recent_n_in_order() {
        let f = write_history("one\ntwo\nthree\nfour\n");
        let cmds = read_last_commands(f.path(), "bash", 2);
        assert_eq!(cmds, vec!["three", "four"]);
    }

    #[test]
    fn filters_own_invocations() {
        let f = write_history("komplete list files\nk do something\nls\nkubectl get pods\n");
        let cmds = read_last_commands(f.path(), "bash", 5);
        assert_eq!(cmds, vec!["ls", "kubectl get pods"]);
    }

    #[test]
    fn missing_file_is_empty() {
        let cmds = read_last_commands(std::path::Path::new("/nonexistent/history"), "bash", 5);
        assert!(cmds.is_empty());
    }
}
