//! Shell command templates sent to Windows hosts.
//!
//! Commands that embed the AD service account password carry a second,
//! redacted rendering which is what gets logged.

use crate::AdCredentials;
use std::fmt;

/// Appended to batch commands so the exit code shows up in the output.
pub const ERRORLEVEL_ECHO: &str = " & echo ERRORLEVEL: %ERRORLEVEL%";

pub const PASSWORD_MASK: &str = "********";

/// `shutdown /c` rejects comments longer than this.
pub const SHUTDOWN_COMMENT_LIMIT: usize = 512;

#[derive(Clone, PartialEq, Eq)]
pub struct ShellCommand {
    text: String,
    redacted: String,
}

impl ShellCommand {
    fn plain(text: String) -> Self {
        Self {
            redacted: text.clone(),
            text,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShellCommand").field(&self.redacted).finish()
    }
}

/// Current hostname. Runs bare so that the hostname is the first line of output.
pub fn hostname() -> ShellCommand {
    ShellCommand::plain("hostname".to_string())
}

pub fn verify_domain() -> ShellCommand {
    ShellCommand::plain(format!("NETDOM VERIFY %COMPUTERNAME%{ERRORLEVEL_ECHO}"))
}

pub fn join_domain(domain: &str, ou: Option<&str>, credentials: &AdCredentials) -> ShellCommand {
    let render = |password: &str| {
        let ou_clause = ou.map(|ou| format!(" /OU:\"{ou}\"")).unwrap_or_default();
        format!(
            "NETDOM JOIN /Domain:{domain} localhost{ou_clause}{}{ERRORLEVEL_ECHO}",
            credential_clause(credentials, password)
        )
    };

    ShellCommand {
        text: render(&credentials.password),
        redacted: render(PASSWORD_MASK),
    }
}

/// Rename the local machine. Credentials are only needed once it is a domain member.
pub fn rename_computer(new_name: &str, credentials: Option<&AdCredentials>) -> ShellCommand {
    let render = |password: &str| {
        let clause = credentials
            .map(|credentials| credential_clause(credentials, password))
            .unwrap_or_default();
        format!("NETDOM RENAMECOMPUTER %COMPUTERNAME% /NewName:{new_name}{clause} /Force{ERRORLEVEL_ECHO}")
    };

    match credentials {
        Some(credentials) => ShellCommand {
            text: render(&credentials.password),
            redacted: render(PASSWORD_MASK),
        },
        None => ShellCommand::plain(render("")),
    }
}

/// Immediate planned restart with a comment naming the instance.
pub fn restart(comment: &str) -> ShellCommand {
    ShellCommand::plain(format!(
        "shutdown /r /t 0 /d P:2:4 /c \"{}\"{ERRORLEVEL_ECHO}",
        sanitize_comment(comment)
    ))
}

pub fn reboot_message(instance_id: &str, note: Option<&str>) -> String {
    match note.map(str::trim).filter(|note| !note.is_empty()) {
        Some(note) => format!("Rebooting instance {instance_id} {note}"),
        None => format!("Rebooting instance {instance_id}"),
    }
}

fn credential_clause(credentials: &AdCredentials, password: &str) -> String {
    format!(
        " /UserD:{} /PasswordD:\"{password}\"",
        credentials.account()
    )
}

fn sanitize_comment(comment: &str) -> String {
    comment
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' { '\'' } else { c })
        .take(SHUTDOWN_COMMENT_LIMIT)
        .collect()
}
