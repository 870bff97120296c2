//! Slash-free user commands typed into the interactive loop (`todo add ...`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use super::CoreState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid task id '{0}'")]
    InvalidId(String),
    #[error("unknown subcommand: {0}. Use 'todo help' for help")]
    UnknownSubcommand(String),
    #[error(transparent)]
    Todo(#[from] super::TodoError),
}

/// Handler invoked with the shared state and the whitespace-split arguments.
pub type CommandHandler =
    Arc<dyn Fn(&CoreState, &[&str]) -> Result<String, CommandError> + Send + Sync>;

/// Name-keyed command table.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, CommandHandler>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, handler: CommandHandler) {
        self.commands.write().insert(name.into(), handler);
    }

    /// Whether the first word of `input` names a registered command.
    pub fn is_command(&self, input: &str) -> bool {
        input
            .split_whitespace()
            .next()
            .map(|cmd| self.commands.read().contains_key(cmd))
            .unwrap_or(false)
    }

    /// Parse and run one command line. Empty input yields an empty output.
    pub fn execute(&self, input: &str, state: &CoreState) -> Result<String, CommandError> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((cmd, args)) = parts.split_first() else {
            return Ok(String::new());
        };

        let handler = self
            .commands
            .read()
            .get(*cmd)
            .cloned()
            .ok_or_else(|| CommandError::Unknown(cmd.to_string()))?;
        handler(state, args)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().keys().cloned().collect();
        names.sort();
        names
    }
}

const TODO_HELP: &str = "Todo commands:
  todo                    - show the current plan
  todo add <description>  - add a task
  todo done <id>          - mark a task as done
  todo fail <id> <reason> - mark a task as failed
  todo clear              - clear the whole plan
  todo help               - show this help";

/// Register the `todo` command and its `t` alias.
pub fn setup_todo_commands(registry: &CommandRegistry) {
    let todo: CommandHandler = Arc::new(todo_command);
    registry.register("todo", todo.clone());
    registry.register("t", todo);
}

fn todo_command(state: &CoreState, args: &[&str]) -> Result<String, CommandError> {
    let todo = state.todo();
    let Some((sub, rest)) = args.split_first() else {
        return Ok(todo.render());
    };

    match *sub {
        "add" => {
            if rest.is_empty() {
                return Err(CommandError::Usage("todo add <description>"));
            }
            let description = rest.join(" ");
            let id = todo.add(description.clone(), None);
            Ok(format!("Added task {id}: {description}"))
        }
        "done" => {
            let id = parse_id(rest.first().copied(), "todo done <id>")?;
            todo.complete(id)?;
            Ok(format!("Task {id} done"))
        }
        "fail" => {
            if rest.len() < 2 {
                return Err(CommandError::Usage("todo fail <id> <reason>"));
            }
            let id = parse_id(rest.first().copied(), "todo fail <id> <reason>")?;
            let reason = rest[1..].join(" ");
            todo.fail(id, reason.clone())?;
            Ok(format!("Task {id} failed: {reason}"))
        }
        "clear" => {
            todo.clear();
            Ok("Plan cleared".to_string())
        }
        "help" => Ok(TODO_HELP.to_string()),
        other => Err(CommandError::UnknownSubcommand(other.to_string())),
    }
}

fn parse_id(arg: Option<&str>, usage: &'static str) -> Result<u64, CommandError> {
    let arg = arg.ok_or(CommandError::Usage(usage))?;
    arg.parse().map_err(|_| CommandError::InvalidId(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn state() -> CoreState {
        let state = CoreState::new(AppConfig::default());
        setup_todo_commands(state.commands());
        state
    }

    #[test]
    fn test_todo_lifecycle_through_commands() {
        let st = state();
        let reg = st.commands();

        assert_eq!(reg.execute("todo add check the api", &st).unwrap(), "Added task 1: check the api");
        assert_eq!(reg.execute("t add load sketches", &st).unwrap(), "Added task 2: load sketches");
        assert_eq!(reg.execute("todo done 1", &st).unwrap(), "Task 1 done");
        assert_eq!(
            reg.execute("todo fail 2 bucket is empty", &st).unwrap(),
            "Task 2 failed: bucket is empty"
        );

        let plan = reg.execute("todo", &st).unwrap();
        assert!(plan.contains("[✓] 1. check the api"));
        assert!(plan.contains("Error: bucket is empty"));

        assert_eq!(reg.execute("todo clear", &st).unwrap(), "Plan cleared");
        assert_eq!(st.todo().stats().total, 0);
    }

    #[test]
    fn test_errors() {
        let st = state();
        let reg = st.commands();

        assert_eq!(
            reg.execute("deploy now", &st),
            Err(CommandError::Unknown("deploy".into()))
        );
        assert_eq!(
            reg.execute("todo add", &st),
            Err(CommandError::Usage("todo add <description>"))
        );
        assert_eq!(
            reg.execute("todo done x", &st),
            Err(CommandError::InvalidId("x".into()))
        );
        assert!(matches!(
            reg.execute("todo done 7", &st),
            Err(CommandError::Todo(_))
        ));
        assert_eq!(
            reg.execute("todo frobnicate", &st),
            Err(CommandError::UnknownSubcommand("frobnicate".into()))
        );
        assert_eq!(reg.execute("   ", &st).unwrap(), "");
    }

    #[test]
    fn test_is_command_and_names() {
        let st = state();
        assert!(st.commands().is_command("todo add x"));
        assert!(!st.commands().is_command("what is the weather"));
        assert_eq!(st.commands().names(), vec!["t", "todo"]);
    }
}
