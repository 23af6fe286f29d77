pub mod process;

use crate::shared::error::{DaemonError, DaemonResult};
use crate::shared::types::{CommandResult, OutputLine, ShellCommand};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Opens shell sessions on remote hosts.
#[async_trait]
pub trait RemoteCommandChannel: Send + Sync {
    async fn open(
        &self,
        host: &str,
        user: &str,
        secret: &str,
    ) -> DaemonResult<Box<dyn RemoteSession>>;
}

/// One session to one host. Batches run to completion before `run` returns.
#[async_trait]
pub trait RemoteSession: Send {
    fn host(&self) -> &str;

    /// Run the commands in order and return every output line in append order
    async fn run(&mut self, commands: &[ShellCommand]) -> DaemonResult<CommandResult>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub host: String,
    pub user: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
enum Reply {
    Lines(Vec<String>),
    Fail(String),
}

#[derive(Debug)]
struct Script {
    prefix: String,
    replies: VecDeque<Reply>,
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: Vec<Script>,
    sessions: Vec<SessionRecord>,
    executed: Vec<String>,
    open_failure: Option<String>,
}

/// Channel that answers commands from a script instead of a real host.
///
/// A command gets the replies of the first script whose prefix it starts with.
/// Replies are consumed in order and the last one repeats; unmatched commands
/// produce no output.
#[derive(Clone, Default)]
pub struct ScriptedCommandChannel {
    state: Arc<RwLock<ScriptState>>,
}

impl ScriptedCommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, prefix: &str, lines: &[&str]) -> Self {
        self.with_responses(prefix, &[lines])
    }

    /// Successive replies for repeated commands with the same prefix.
    pub fn with_responses(self, prefix: &str, replies: &[&[&str]]) -> Self {
        let replies = replies
            .iter()
            .map(|lines| Reply::Lines(lines.iter().map(|line| line.to_string()).collect()))
            .collect();
        self.push_script(prefix, replies)
    }

    pub fn with_failure(self, prefix: &str, message: &str) -> Self {
        self.push_script(prefix, VecDeque::from([Reply::Fail(message.to_string())]))
    }

    pub fn with_open_failure(self, message: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.open_failure = Some(message.to_string());
        }
        self
    }

    fn push_script(self, prefix: &str, replies: VecDeque<Reply>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.scripts.push(Script {
                prefix: prefix.to_string(),
                replies,
            });
        }
        self
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.state
            .read()
            .map(|state| state.sessions.clone())
            .unwrap_or_default()
    }

    /// Every command run so far, unredacted, across all sessions.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .read()
            .map(|state| state.executed.clone())
            .unwrap_or_default()
    }

    pub fn executed_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|command| command.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl RemoteCommandChannel for ScriptedCommandChannel {
    async fn open(
        &self,
        host: &str,
        user: &str,
        secret: &str,
    ) -> DaemonResult<Box<dyn RemoteSession>> {
        let mut state = self.state.write().map_err(|_| lock_poisoned())?;
        if let Some(message) = &state.open_failure {
            return Err(DaemonError::RemoteShell(message.clone()));
        }
        state.sessions.push(SessionRecord {
            host: host.to_string(),
            user: user.to_string(),
            secret: secret.to_string(),
        });

        Ok(Box::new(ScriptedSession {
            host: host.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct ScriptedSession {
    host: String,
    state: Arc<RwLock<ScriptState>>,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&mut self, commands: &[ShellCommand]) -> DaemonResult<CommandResult> {
        let mut state = self.state.write().map_err(|_| lock_poisoned())?;
        let mut lines = Vec::new();

        for command in commands {
            state.executed.push(command.as_str().to_string());

            let reply = state
                .scripts
                .iter_mut()
                .find(|script| command.as_str().starts_with(&script.prefix))
                .and_then(|script| {
                    if script.replies.len() > 1 {
                        script.replies.pop_front()
                    } else {
                        script.replies.front().cloned()
                    }
                });

            match reply {
                Some(Reply::Lines(output)) => {
                    lines.extend(output.into_iter().map(|line| OutputLine {
                        host: self.host.clone(),
                        line,
                    }));
                }
                Some(Reply::Fail(message)) => return Err(DaemonError::RemoteShell(message)),
                None => {}
            }
        }

        Ok(CommandResult::new(lines))
    }
}

fn lock_poisoned() -> DaemonError {
    DaemonError::StorageError("Lock poisoned".to_string())
}
