//! One-shot plan generation and execution for the root command.
//!
//! Turns a natural-language request plus context into a list of shell
//! commands, shows the plan, asks for confirmation, and runs the selection
//! through the user's shell.

use std::io::{BufRead, Write};
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::context::{build_context, Context};
use crate::history::shell_history;
use crate::json_extract::extract_json;
use crate::suggest::GroqClient;
use crate::util::truncate;

const PLAN_MAX_TOKENS: u32 = 600;

const PLAN_SYSTEM_PROMPT: &str = r#"You are a shell command planner. You receive the user's operating system, shell, working directory, git state, recent command history, and a natural-language request.

Return a JSON object with this exact shape and nothing else:
{"commands": [{"cmd": "<shell command>", "explanation": "<one short sentence>"}]}

Rules:
- Use real, standard commands available on the stated OS. Do not invent commands.
- Prefer the smallest plan that satisfies the request; one command when one is enough.
- Commands run non-interactively through the user's shell; avoid editors and pagers.
- No markdown, no prose outside the JSON object."#;

// dim / cyan / bold-green / bold-yellow / reset
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const GREEN_BOLD: &str = "\x1b[1;32m";
const YELLOW_BOLD: &str = "\x1b[1;33m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Deserialize)]
pub struct PlanCommand {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub commands: Vec<PlanCommand>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub dry_run: bool,
    pub model: Option<String>,
    pub shell: Option<String>,
    pub cwd: Option<String>,
    pub timeout: Option<u64>,
    pub verbose: bool,
}

/// Entry point for `komplete <request...>`.
pub async fn run_request(request: &str, opts: &RequestOptions) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let api_key = crate::config::resolve_api_key(&config)?;

    let ctx = build_context(
        opts.shell.as_deref().or(config.shell.as_deref()),
        opts.cwd.as_deref().or(config.cwd.as_deref()),
    )?;
    let history = shell_history(&ctx.shell);

    if opts.verbose {
        eprintln!(
            "Request: {request}\nOS: {}\nShell: {}\nCWD: {}\nRepo: {}\nGit: {}\nShell history:\n{history}",
            ctx.os, ctx.shell, ctx.cwd, ctx.repo_root, ctx.git_status
        );
    }

    let timeout = Duration::from_secs(opts.timeout.or(config.timeout).unwrap_or(10));
    let model = opts.model.clone().or(config.model);
    let client = GroqClient::new(api_key, model, timeout);

    let mut plan = generate_plan_with_repair(&client, request, &ctx, &history).await?;
    plan.commands = filter_commands(plan.commands);
    if plan.commands.is_empty() {
        println!("No commands to run.");
        return Ok(());
    }

    print_plan(&plan.commands);

    if opts.dry_run {
        return Ok(());
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let selected = select_commands(&mut stdin.lock(), &mut stdout, plan.commands.len())?;
    if selected.is_empty() {
        bail!("aborted");
    }

    println!();
    let total = selected.len();
    for (i, idx) in selected.into_iter().enumerate() {
        let cmd = &plan.commands[idx].cmd;
        print_running_command(i + 1, total, cmd);
        let status = Command::new(&ctx.shell)
            .args(["-lc", cmd])
            .current_dir(&ctx.cwd)
            .status()
            .with_context(|| format!("run {}", truncate(cmd, 60)))?;
        if !status.success() {
            bail!("command failed with {status}");
        }
        println!();
    }

    Ok(())
}

async fn generate_plan(
    client: &GroqClient,
    request: &str,
    ctx: &Context,
    history: &str,
) -> Result<Plan> {
    let user = build_plan_prompt(request, ctx, history);
    let raw = client.chat(PLAN_SYSTEM_PROMPT, &user, PLAN_MAX_TOKENS).await?;
    let value = extract_json(&raw)
        .ok_or_else(|| anyhow!("model returned no JSON plan: {}", truncate(&raw, 120)))?;
    let plan: Plan = serde_json::from_value(value).context("plan did not match expected shape")?;
    Ok(plan)
}

/// Generate a plan, and when it names entrypoints that do not exist on this
/// machine, ask once for a corrected plan. Entrypoints still invalid after
/// the repair round are dropped.
async fn generate_plan_with_repair(
    client: &GroqClient,
    request: &str,
    ctx: &Context,
    history: &str,
) -> Result<Plan> {
    let mut plan = generate_plan(client, request, ctx, history).await?;
    plan.commands = filter_commands(plan.commands);

    let invalid = invalid_commands(&ctx.shell, &ctx.cwd, &plan.commands);
    if invalid.is_empty() {
        return Ok(plan);
    }
    debug!(invalid = ?invalid, "plan has unknown entrypoints, requesting repair");

    let repair_request = format!(
        "{request}\n\nThe previous plan included invalid commands: {}. \
         Replace them with valid, standard macOS/Linux shell commands. Do not invent commands.",
        invalid.join(", ")
    );
    let mut repaired = match generate_plan(client, &repair_request, ctx, history).await {
        Ok(p) => p,
        // keep the first plan rather than failing the whole request
        Err(err) => {
            debug!(%err, "repair round failed");
            return Ok(plan);
        }
    };
    repaired.commands = filter_commands(repaired.commands);
    if !invalid_commands(&ctx.shell, &ctx.cwd, &repaired.commands).is_empty() {
        repaired.commands = drop_invalid_commands(&ctx.shell, &ctx.cwd, repaired.commands);
    }
    Ok(repaired)
}

fn build_plan_prompt(request: &str, ctx: &Context, history: &str) -> String {
    let mut prompt = format!(
        "os: {}\nshell: {}\ncwd: {}\n",
        ctx.os, ctx.shell, ctx.cwd
    );
    if !ctx.repo_root.is_empty() {
        prompt.push_str(&format!("repo root: {}\n", ctx.repo_root));
    }
    if !ctx.git_status.is_empty() {
        prompt.push_str(&format!("git status:\n{}\n", ctx.git_status));
    }
    if !history.is_empty() && history != crate::history::NO_HISTORY {
        prompt.push_str("recent history:\n");
        for line in history.lines() {
            prompt.push_str("  ");
            prompt.push_str(line);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nrequest: ");
    prompt.push_str(request);
    prompt
}

fn filter_commands(commands: Vec<PlanCommand>) -> Vec<PlanCommand> {
    commands
        .into_iter()
        .filter_map(|mut c| {
            c.cmd = c.cmd.trim().to_string();
            if c.cmd.is_empty() {
                None
            } else {
                Some(c)
            }
        })
        .collect()
}

fn invalid_commands(shell: &str, cwd: &str, commands: &[PlanCommand]) -> Vec<String> {
    let mut invalid = Vec::new();
    for c in commands {
        let Some(name) = command_entrypoint(&c.cmd) else {
            continue;
        };
        if invalid.iter().any(|n| n == name) {
            continue;
        }
        if !command_exists(shell, cwd, name) {
            invalid.push(name.to_string());
        }
    }
    invalid
}

fn drop_invalid_commands(shell: &str, cwd: &str, commands: Vec<PlanCommand>) -> Vec<PlanCommand> {
    commands
        .into_iter()
        .filter(|c| match command_entrypoint(&c.cmd) {
            Some(name) => command_exists(shell, cwd, name),
            None => true,
        })
        .collect()
}

fn command_exists(shell: &str, cwd: &str, name: &str) -> bool {
    let check = format!("command -v -- {} >/dev/null 2>&1", shell_quote(name));
    Command::new(shell)
        .args(["-lc", &check])
        .current_dir(cwd)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// The command name actually being invoked, skipping env assignments and the
/// `sudo`/`env` wrappers.
fn command_entrypoint(command: &str) -> Option<&str> {
    let mut fields = command.split_whitespace().skip_while(|f| is_env_assignment(f));
    let mut first = fields.next()?;
    if first == "sudo" || first == "env" {
        first = fields.find(|f| !is_env_assignment(f))?;
    }
    Some(first)
}

fn is_env_assignment(token: &str) -> bool {
    let Some(eq) = token.find('=') else {
        return false;
    };
    if eq == 0 {
        return false;
    }
    let name = &token[..eq];
    name.chars().enumerate().all(|(i, c)| {
        if i == 0 {
            c == '_' || c.is_ascii_alphabetic()
        } else {
            c == '_' || c.is_ascii_alphanumeric()
        }
    })
}

fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn print_plan(commands: &[PlanCommand]) {
    let header = if commands.len() > 1 {
        "Commands ⟶"
    } else {
        "Command ⟶"
    };
    println!("{GREEN_BOLD}{header}{RESET}");
    for (i, c) in commands.iter().enumerate() {
        println!("{DIM}{:<4}{RESET}  {CYAN}{}{RESET}", format!("{})", i + 1), c.cmd);
        if !c.explanation.is_empty() {
            println!("      {DIM}{}{RESET}", c.explanation);
        }
    }
    println!();
}

fn print_running_command(current: usize, total: usize, cmd: &str) {
    if total == 1 {
        println!("{GREEN_BOLD}{cmd}{RESET}");
    } else {
        println!("{DIM}[{current}/{total}]{RESET} {GREEN_BOLD}{cmd}{RESET}");
    }
}

fn select_commands(
    input: &mut impl BufRead,
    output: &mut impl Write,
    total: usize,
) -> Result<Vec<usize>> {
    let prompt = if total > 1 {
        "Run these commands?"
    } else {
        "Run this command?"
    };
    write!(output, "{YELLOW_BOLD}{prompt}{RESET}{DIM} [y/N/#] {RESET}")
        .context("write prompt")?;
    output.flush().context("flush prompt")?;

    let mut line = String::new();
    input.read_line(&mut line).context("read answer")?;
    Ok(parse_selection(&line, total))
}

/// `y`/`yes` selects everything, a number selects one command, anything else
/// selects nothing.
fn parse_selection(answer: &str, total: usize) -> Vec<usize> {
    let answer = answer.trim().to_ascii_lowercase();
    match answer.as_str() {
        "" | "n" | "no" => Vec::new(),
        "y" | "yes" => (0..total).collect(),
        _ => match answer.parse::<usize>() {
            Ok(num) if num >= 1 && num <= total => vec![num - 1],
            _ => Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_yes_selects_all() {
        assert_eq!(parse_selection("y\n", 3), vec![0, 1, 2]);
        assert_eq!(parse_selection("YES\n", 2), vec![0, 1]);
    }

    #[test]
    fn selection_default_is_none() {
        assert!(parse_selection("\n", 3).is_empty());
        assert!(parse_selection("n\n", 3).is_empty());
        assert!(parse_selection("no\n", 3).is_empty());
    }

    #[test]
    fn selection_number_picks_one() {
        assert_eq!(parse_selection("2\n", 3), vec![1]);
        assert!(parse_selection("0\n", 3).is_empty());
        assert!(parse_selection("4\n", 3).is_empty());
        assert!(parse_selection("maybe\n", 3).is_empty());
    }

    #[test]
    fn entrypoint_skips_env_and_wrappers() {
        assert_eq!(command_entrypoint("FOO=1 BAR=2 make build"), Some("make"));
        assert_eq!(command_entrypoint("sudo apt install jq"), Some("apt"));
        assert_eq!(command_entrypoint("env RUST_LOG=debug cargo test"), Some("cargo"));
        assert_eq!(command_entrypoint("ls -la"), Some("ls"));
        assert_eq!(command_entrypoint("FOO=1"), None);
        assert_eq!(command_entrypoint(""), None);
    }

    #[test]
    fn env_assignment_detection() {
        assert!(is_env_assignment("FOO=bar"));
        assert!(is_env_assignment("_x1=2"));
        assert!(!is_env_assignment("=bad"));
        assert!(!is_env_assignment("1X=2"));
        assert!(!is_env_assignment("ls"));
        assert!(!is_env_assignment("a-b=c"));
    }

    #[test]
    fn filter_drops_blank_commands() {
        let commands = vec![
            PlanCommand {
                cmd: "  ls  ".into(),
                explanation: String::new(),
            },
            PlanCommand {
                cmd: "   ".into(),
                explanation: "blank".into(),
            },
        ];
        let filtered = filter_commands(commands);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].cmd, "ls");
    }

    #[test]
    fn shell_quote_escapes() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("ls"), "'ls'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn plan_deserializes_from_extracted_json() {
        let raw = "```json\n{\"commands\":[{\"cmd\":\"ls\",\"explanation\":\"list files\"}]}\n```";
        let value = extract_json(raw).unwrap();
        let plan: Plan = serde_json::from_value(value).unwrap();
        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.commands[0].cmd, "ls");
    }

    #[test]
    fn plan_prompt_skips_empty_sections() {
        let ctx = Context {
            os: "linux".into(),
            shell: "zsh".into(),
            cwd: "/tmp".into(),
            repo_root: String::new(),
            git_status: String::new(),
        };
        let p = build_plan_prompt("list files", &ctx, crate::history::NO_HISTORY);
        assert!(!p.contains("repo root"));
        assert!(!p.contains("git status"));
        assert!(!p.contains("recent history"));
        assert!(p.ends_with("request: list files"));
    }
}
