//! Tools letting the model maintain its own task plan.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::state::TodoManager;
use crate::tools::factory::BuildContext;
use crate::tools::{empty_parameters, parse_args, Tool, ToolDefinition, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerTool {
    Add,
    MarkDone,
    MarkFailed,
    Clear,
    SetTasks,
}

impl PlannerTool {
    fn name(self) -> &'static str {
        match self {
            PlannerTool::Add => "plan_add_task",
            PlannerTool::MarkDone => "plan_mark_done",
            PlannerTool::MarkFailed => "plan_mark_failed",
            PlannerTool::Clear => "plan_clear",
            PlannerTool::SetTasks => "plan_set_tasks",
        }
    }

    fn default_description(self) -> &'static str {
        match self {
            PlannerTool::Add => "Adds a task to the plan.",
            PlannerTool::MarkDone => "Marks a plan task as done.",
            PlannerTool::MarkFailed => "Marks a plan task as failed with a reason.",
            PlannerTool::Clear => "Removes every task from the plan.",
            PlannerTool::SetTasks => "Replaces the plan with the given tasks.",
        }
    }
}

pub fn build(kind: PlannerTool, todo: Arc<TodoManager>, ctx: &BuildContext<'_>) -> Arc<dyn Tool> {
    Arc::new(PlanTool {
        kind,
        description: ctx.description(kind.default_description()),
        todo,
    })
}

pub struct PlanTool {
    kind: PlannerTool,
    description: String,
    todo: Arc<TodoManager>,
}

#[derive(Deserialize)]
struct TaskArgs {
    #[serde(default)]
    task_id: u64,
    #[serde(default)]
    reason: String,
}

#[async_trait]
impl Tool for PlanTool {
    fn definition(&self) -> ToolDefinition {
        let task_id = json!({"type": "integer", "description": "Task ID from the current plan"});
        let parameters = match self.kind {
            PlannerTool::Add => json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string", "description": "What needs to be done"}
                },
                "required": ["description"]
            }),
            PlannerTool::MarkDone => json!({
                "type": "object",
                "properties": {"task_id": task_id},
                "required": ["task_id"]
            }),
            PlannerTool::MarkFailed => json!({
                "type": "object",
                "properties": {
                    "task_id": task_id,
                    "reason": {"type": "string", "description": "Why the task failed"}
                },
                "required": ["task_id", "reason"]
            }),
            PlannerTool::Clear => empty_parameters(),
            PlannerTool::SetTasks => json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"description": {"type": "string"}},
                            "required": ["description"]
                        },
                        "description": "The new plan, in order"
                    }
                },
                "required": ["tasks"]
            }),
        };
        ToolDefinition::new(self.kind.name(), &self.description, parameters)
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        match self.kind {
            PlannerTool::Add => {
                #[derive(Deserialize)]
                struct Args {
                    #[serde(default)]
                    description: String,
                }
                let args: Args = parse_args(args_json)?;
                let description = args.description.trim();
                if description.is_empty() {
                    return Err(ToolError::InvalidArguments(
                        "task description cannot be empty".into(),
                    ));
                }
                let id = self.todo.add(description, None);
                Ok(format!("Task added to the plan (ID: {id}): {description}"))
            }
            PlannerTool::MarkDone => {
                let args: TaskArgs = parse_args(args_json)?;
                self.todo.complete(args.task_id)?;
                Ok(format!("Task {} marked as done", args.task_id))
            }
            PlannerTool::MarkFailed => {
                let args: TaskArgs = parse_args(args_json)?;
                if args.reason.trim().is_empty() {
                    return Err(ToolError::InvalidArguments("reason cannot be empty".into()));
                }
                self.todo.fail(args.task_id, args.reason.clone())?;
                Ok(format!("Task {} marked as failed: {}", args.task_id, args.reason))
            }
            PlannerTool::Clear => {
                self.todo.clear();
                Ok("Plan cleared".to_string())
            }
            PlannerTool::SetTasks => {
                #[derive(Deserialize)]
                struct NewTask {
                    description: String,
                }
                #[derive(Deserialize)]
                struct Args {
                    #[serde(default)]
                    tasks: Vec<NewTask>,
                }
                let args: Args = parse_args(args_json)?;
                if args.tasks.is_empty() {
                    return Err(ToolError::InvalidArguments("tasks cannot be empty".into()));
                }
                let ids = self
                    .todo
                    .set_tasks(args.tasks.into_iter().map(|t| t.description));
                Ok(format!("Plan replaced with {} tasks\n\n{}", ids.len(), self.todo.render()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ToolConfig};
    use crate::state::{CoreState, TaskStatus, TodoError};

    fn tool(kind: PlannerTool, todo: &Arc<TodoManager>) -> Arc<dyn Tool> {
        let cfg = AppConfig::default();
        let tool_cfg = ToolConfig::default();
        let state = Arc::new(CoreState::new(cfg.clone()));
        let ctx = BuildContext {
            name: kind.name(),
            tool: &tool_cfg,
            config: &cfg,
            state: &state,
        };
        build(kind, todo.clone(), &ctx)
    }

    #[tokio::test]
    async fn test_plan_flow() {
        let todo = Arc::new(TodoManager::new());
        let add = tool(PlannerTool::Add, &todo);
        let done = tool(PlannerTool::MarkDone, &todo);
        let fail = tool(PlannerTool::MarkFailed, &todo);

        assert_eq!(
            add.execute(r#"{"description": "load funnel"}"#).await.unwrap(),
            "Task added to the plan (ID: 1): load funnel"
        );
        add.execute(r#"{"description": "compare periods"}"#).await.unwrap();
        done.execute(r#"{"task_id": 1}"#).await.unwrap();
        fail.execute(r#"{"task_id": 2, "reason": "no data"}"#).await.unwrap();

        let tasks = todo.tasks();
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[1].failure_reason(), Some("no data"));
    }

    #[tokio::test]
    async fn test_errors_surface_to_the_model() {
        let todo = Arc::new(TodoManager::new());
        let add = tool(PlannerTool::Add, &todo);
        let done = tool(PlannerTool::MarkDone, &todo);

        assert!(matches!(
            add.execute(r#"{"description": "  "}"#).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            done.execute(r#"{"task_id": 9}"#).await,
            Err(ToolError::Todo(TodoError::NotFound(9)))
        ));
    }

    #[tokio::test]
    async fn test_set_tasks_replaces_plan() {
        let todo = Arc::new(TodoManager::new());
        todo.add("old", None);
        let set = tool(PlannerTool::SetTasks, &todo);
        let out = set
            .execute(r#"{"tasks": [{"description": "a"}, {"description": "b"}]}"#)
            .await
            .unwrap();
        assert!(out.starts_with("Plan replaced with 2 tasks"));
        let tasks = todo.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, 1);

        tool(PlannerTool::Clear, &todo).execute("").await.unwrap();
        assert!(todo.tasks().is_empty());
    }
}
