//! Start-on-login registration for the agent.
//!
//! - **macOS**: launchd plist in `~/Library/LaunchAgents/`, loaded with `launchctl`
//! - **Linux**: XDG desktop entry in `~/.config/autostart/`
//! - **Windows**: `HKCU\...\Run` value written through PowerShell

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{info, warn};

const LAUNCHD_LABEL: &str = "dev.courier.agent";
const DESKTOP_FILE: &str = "courier-agent.desktop";
const REGISTRY_VALUE: &str = "CourierAgent";
const RUN_KEY: &str = r"HKCU:\Software\Microsoft\Windows\CurrentVersion\Run";

#[derive(Debug, Error)]
pub enum AutostartError {
    #[error("could not determine the home directory")]
    NoHomeDirectory,

    #[error("could not resolve the agent executable: {0}")]
    Executable(#[source] io::Error),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed: {detail}")]
    Command { program: &'static str, detail: String },

    #[error("autostart is not supported on {0}")]
    Unsupported(&'static str),
}

/// A per-platform way of starting the agent when the user logs in.
pub trait Autostart {
    /// Register `executable` to start on login and try to start it now.
    fn register(&self, executable: &Path) -> Result<(), AutostartError>;

    /// Remove the registration. Removing a missing registration succeeds.
    fn unregister(&self) -> Result<(), AutostartError>;

    /// Where the registration lives, for messages.
    fn location(&self) -> String;
}

/// The registration mechanism for the platform this binary was built for.
pub fn platform_autostart() -> Result<Box<dyn Autostart>, AutostartError> {
    if cfg!(target_os = "macos") {
        Ok(Box::new(LaunchAgent::new(&home_dir()?)))
    } else if cfg!(target_os = "linux") {
        Ok(Box::new(XdgAutostart::new(&home_dir()?)))
    } else if cfg!(target_os = "windows") {
        Ok(Box::new(RegistryRun::new()))
    } else {
        Err(AutostartError::Unsupported(std::env::consts::OS))
    }
}

/// Path of the running binary with symlinks resolved.
pub fn current_executable() -> Result<PathBuf, AutostartError> {
    let exe = std::env::current_exe().map_err(AutostartError::Executable)?;
    exe.canonicalize().map_err(AutostartError::Executable)
}

fn home_dir() -> Result<PathBuf, AutostartError> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or(AutostartError::NoHomeDirectory)
}

fn write_file(path: &Path, content: &str) -> Result<(), AutostartError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| AutostartError::Io {
            action: "failed to create",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| AutostartError::Io {
        action: "failed to write",
        path: path.to_path_buf(),
        source,
    })
}

fn remove_file(path: &Path) -> Result<(), AutostartError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AutostartError::Io {
            action: "failed to remove",
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn run_command(program: &'static str, args: &[&str]) -> Result<(), AutostartError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| AutostartError::Command {
            program,
            detail: e.to_string(),
        })?;
    if output.status.success() {
        return Ok(());
    }
    Err(AutostartError::Command {
        program,
        detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

// ---------------------------------------------------------------------------
// macOS: launchd
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LaunchAgent {
    plist: PathBuf,
    load: bool,
}

impl LaunchAgent {
    pub fn new(home: &Path) -> Self {
        Self {
            plist: home
                .join("Library")
                .join("LaunchAgents")
                .join(format!("{LAUNCHD_LABEL}.plist")),
            load: true,
        }
    }

    /// Write and remove the plist without calling `launchctl`.
    pub fn without_launchctl(mut self) -> Self {
        self.load = false;
        self
    }

    pub fn plist_path(&self) -> &Path {
        &self.plist
    }
}

pub fn launchd_plist(executable: &Path) -> String {
    let logs = std::env::temp_dir();
    let binary = escape_xml(&executable.display().to_string());
    let stdout = escape_xml(&logs.join("courier-agent.log").display().to_string());
    let stderr = escape_xml(&logs.join("courier-agent.err").display().to_string());
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LAUNCHD_LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{binary}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>{stdout}</string>
    <key>StandardErrorPath</key>
    <string>{stderr}</string>
</dict>
</plist>
"#
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

impl Autostart for LaunchAgent {
    fn register(&self, executable: &Path) -> Result<(), AutostartError> {
        write_file(&self.plist, &launchd_plist(executable))?;
        if self.load {
            let plist = self.plist.to_string_lossy();
            if run_command("launchctl", &["load", &plist]).is_err() {
                // Already loaded: reload so the new plist takes effect.
                let _ = run_command("launchctl", &["unload", &plist]);
                run_command("launchctl", &["load", &plist])?;
            }
        }
        info!(plist = %self.plist.display(), "installed launch agent");
        Ok(())
    }

    fn unregister(&self) -> Result<(), AutostartError> {
        if self.load && self.plist.exists() {
            let plist = self.plist.to_string_lossy();
            if let Err(e) = run_command("launchctl", &["unload", &plist]) {
                warn!(error = %e, "launchctl unload failed");
            }
        }
        remove_file(&self.plist)?;
        info!(plist = %self.plist.display(), "removed launch agent");
        Ok(())
    }

    fn location(&self) -> String {
        self.plist.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Linux: XDG autostart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct XdgAutostart {
    entry: PathBuf,
    spawn: bool,
}

impl XdgAutostart {
    pub fn new(home: &Path) -> Self {
        Self {
            entry: home.join(".config").join("autostart").join(DESKTOP_FILE),
            spawn: true,
        }
    }

    /// Write the entry without starting the agent.
    pub fn without_spawn(mut self) -> Self {
        self.spawn = false;
        self
    }

    pub fn entry_path(&self) -> &Path {
        &self.entry
    }
}

pub fn desktop_entry(executable: &Path) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name=Courier Agent\n\
         Exec={}\n\
         Hidden=false\n\
         NoDisplay=false\n\
         X-GNOME-Autostart-enabled=true\n\
         Comment=Local agent for Courier API testing\n",
        quote_exec(&executable.display().to_string())
    )
}

/// Quote an `Exec` argument per the desktop entry rules.
fn quote_exec(arg: &str) -> String {
    let plain = arg
        .chars()
        .all(|c| !c.is_whitespace() && !"\"'\\`$<>~|&;*?#()".contains(c));
    if plain {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

impl Autostart for XdgAutostart {
    fn register(&self, executable: &Path) -> Result<(), AutostartError> {
        write_file(&self.entry, &desktop_entry(executable))?;
        info!(entry = %self.entry.display(), "installed autostart entry");
        if self.spawn {
            match Command::new(executable).spawn() {
                Ok(child) => info!(pid = child.id(), "agent started in background"),
                Err(e) => warn!(error = %e, "could not start agent now, it will start on next login"),
            }
        }
        Ok(())
    }

    fn unregister(&self) -> Result<(), AutostartError> {
        remove_file(&self.entry)?;
        info!(entry = %self.entry.display(), "removed autostart entry");
        Ok(())
    }

    fn location(&self) -> String {
        self.entry.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Windows: HKCU Run key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RegistryRun;

impl RegistryRun {
    pub fn new() -> Self {
        Self
    }
}

/// Single-quoted PowerShell literal.
fn ps_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn register_script(executable: &Path) -> String {
    let value = format!("\"{}\"", executable.display());
    format!(
        "Set-ItemProperty -Path {} -Name {} -Value {}",
        ps_literal(RUN_KEY),
        ps_literal(REGISTRY_VALUE),
        ps_literal(&value)
    )
}

pub fn unregister_script() -> String {
    format!(
        "Remove-ItemProperty -Path {} -Name {} -ErrorAction SilentlyContinue",
        ps_literal(RUN_KEY),
        ps_literal(REGISTRY_VALUE)
    )
}

impl Autostart for RegistryRun {
    fn register(&self, executable: &Path) -> Result<(), AutostartError> {
        run_command("powershell", &["-NoProfile", "-Command", &register_script(executable)])?;
        info!(key = RUN_KEY, value = REGISTRY_VALUE, "installed registry run entry");
        let start = format!("Start-Process {}", ps_literal(&executable.display().to_string()));
        if let Err(e) = Command::new("powershell").args(["-NoProfile", "-Command", &start]).spawn() {
            warn!(error = %e, "could not start agent now, it will start on next login");
        }
        Ok(())
    }

    fn unregister(&self) -> Result<(), AutostartError> {
        run_command("powershell", &["-NoProfile", "-Command", &unregister_script()])?;
        info!(key = RUN_KEY, value = REGISTRY_VALUE, "removed registry run entry");
        Ok(())
    }

    fn location(&self) -> String {
        format!(r"{RUN_KEY}\{REGISTRY_VALUE}")
    }
}
