//! Launching the per-worktree shell on a fresh PTY.
//!
//! The requested command is a shell fragment, not an argv: it is composed
//! with profile sourcing and PATH setup, runs in the worktree directory,
//! and is followed by `exec`ing an interactive shell so the session stays
//! usable after the command exits.

use std::path::Path;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};

use super::{Launched, NativePty, Spawn};
use crate::error::LaunchError;

/// Tool directories appended to PATH. GUI-launched apps often inherit a
/// minimal PATH, so common user tool locations are added explicitly
/// without overwriting whatever the profiles set up.
const PATH_EXTRAS: &[&str] = &[
    "$HOME/.local/bin",
    "$HOME/.pyenv/bin",
    "$HOME/.pyenv/shims",
    "$HOME/.asdf/bin",
    "$HOME/.asdf/shims",
    "$HOME/.deno/bin",
    "$HOME/.cargo/bin",
    "/opt/homebrew/bin",
    "/opt/homebrew/sbin",
    "/usr/local/bin",
    "/usr/local/sbin",
];

fn login_shell() -> &'static str {
    if cfg!(target_os = "macos") {
        "zsh"
    } else {
        "bash"
    }
}

fn profile_files() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[
            "/etc/zshenv",
            "/etc/zprofile",
            "/etc/profile",
            "~/.zshenv",
            "~/.zprofile",
            "~/.profile",
            "~/.zshrc",
        ]
    } else {
        &[
            "/etc/profile",
            "~/.bash_profile",
            "~/.bash_login",
            "~/.profile",
            "~/.bashrc",
        ]
    }
}

fn shell_escape(value: &str) -> String {
    let mut out = String::from("'");
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Compose the shell fragment the PTY child will run.
pub fn build_shell_command(command: &str, working_dir: &Path) -> String {
    let shell = login_shell();
    let cwd = shell_escape(&working_dir.to_string_lossy());
    let profiles = profile_files().join(" ");
    let extras = PATH_EXTRAS.join(":");
    format!(
        "for f in {profiles}; do [ -f \"$f\" ] && . \"$f\"; done; \
         PATH_EXTRAS=\"{extras}\"; \
         if [ -n \"$PATH\" ]; then PATH=\"$PATH:$PATH_EXTRAS\"; else PATH=\"$PATH_EXTRAS\"; fi; \
         unset PATH_EXTRAS; \
         export LANG=en_US.UTF-8; \
         export LC_ALL=en_US.UTF-8; \
         export LC_CTYPE=en_US.UTF-8; \
         cd {cwd} && {command}; \
         cd {cwd}; \
         exec {shell} -i"
    )
}

/// Launch `command` in a login-capable shell on a new PTY.
///
/// Fails up front if `working_dir` does not exist; callers must not
/// register a session for a failed launch.
pub fn launch(
    command: &str,
    working_dir: &Path,
    env_overrides: &[(String, String)],
    rows: u16,
    cols: u16,
) -> Result<Launched, LaunchError> {
    if !working_dir.is_dir() {
        return Err(LaunchError::WorkingDirMissing(working_dir.to_path_buf()));
    }

    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| LaunchError::OpenPty(e.to_string()))?;

    let mut cmd = CommandBuilder::new(login_shell());
    cmd.arg("-c");
    cmd.arg(build_shell_command(command, working_dir));
    cmd.cwd(working_dir);

    // Color-capable terminal plus UTF-8 locale for agent CLIs.
    cmd.env("TERM", "xterm-256color");
    cmd.env("COLORTERM", "truecolor");
    cmd.env("CLICOLOR", "1");
    cmd.env("CLICOLOR_FORCE", "1");
    cmd.env("LANG", "en_US.UTF-8");
    cmd.env("LC_ALL", "en_US.UTF-8");
    cmd.env("LC_CTYPE", "en_US.UTF-8");
    for (key, value) in env_overrides {
        cmd.env(key, value);
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| LaunchError::Spawn(e.to_string()))?;

    NativePty::from_parts(pair, child).map_err(|e| LaunchError::OpenPty(e.to_string()))
}

/// Default spawner backed by the OS PTY system.
#[derive(Debug, Clone, Default)]
pub struct NativeSpawner {
    /// Extra environment applied after the built-in terminal environment.
    pub env_overrides: Vec<(String, String)>,
}

impl Spawn for NativeSpawner {
    fn spawn(
        &self,
        command: &str,
        working_dir: &Path,
        rows: u16,
        cols: u16,
    ) -> Result<Launched, LaunchError> {
        launch(command, working_dir, &self.env_overrides, rows, cols)
    }
}
