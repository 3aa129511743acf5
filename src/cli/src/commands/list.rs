//! `cortex list` - list stored entities.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use cortex_core::model::{EntityRecord, ItemType};
use cortex_core::store::EntityStore;

use crate::output::{self, OutputFormat};
use crate::runtime::Runtime;

#[derive(Subcommand)]
pub enum ListCommands {
    /// List messages
    Messages(ListArgs),
    /// List tasks
    Tasks(ListArgs),
    /// List todos
    Todos(ListArgs),
    /// List reminders
    Reminders(ReminderArgs),
}

#[derive(Args)]
pub struct ListArgs {
    /// Namespace to list
    #[arg(long, short)]
    pub namespace: String,

    /// Maximum rows
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args)]
pub struct ReminderArgs {
    #[command(flatten)]
    pub base: ListArgs,

    /// Only pending reminders, ordered by due time
    #[arg(long)]
    pub due: bool,
}

#[derive(Tabled, Serialize)]
struct MessageRow {
    id: String,
    status: String,
    created_at: String,
    text: String,
}

#[derive(Tabled, Serialize)]
struct TaskRow {
    id: String,
    title: String,
    status: String,
    priority: String,
    category: String,
    due: String,
}

#[derive(Tabled, Serialize)]
struct TodoRow {
    order: i64,
    text: String,
    completed: bool,
}

#[derive(Tabled, Serialize)]
struct ReminderRow {
    id: String,
    title: String,
    scheduled_for: String,
    status: String,
    recurrence: String,
}

pub async fn execute(cmd: ListCommands, runtime: &Runtime, format: OutputFormat) -> Result<()> {
    let store = runtime.store().await?;

    match cmd {
        ListCommands::Messages(args) => {
            let page = store
                .query_prefix(&args.namespace, ItemType::Message, None, args.limit)
                .await?;
            let rows: Vec<MessageRow> = page
                .items
                .iter()
                .filter_map(|r| match r {
                    EntityRecord::Message(m) => Some(MessageRow {
                        id: m.message_id.to_string(),
                        status: m.status.to_string(),
                        created_at: m.created_at.to_rfc3339(),
                        text: output::truncate(&m.raw_text, 48),
                    }),
                    _ => None,
                })
                .collect();
            output::print_list(&rows, format);
        }
        ListCommands::Tasks(args) => {
            let page = store
                .query_prefix(&args.namespace, ItemType::Task, None, args.limit)
                .await?;
            let rows: Vec<TaskRow> = page
                .items
                .iter()
                .filter_map(|r| match r {
                    EntityRecord::Task(t) => Some(TaskRow {
                        id: t.task_id.to_string(),
                        title: output::truncate(&t.title, 40),
                        status: t.status.to_string(),
                        priority: t.priority.to_string(),
                        category: t.category.clone(),
                        due: t.due_date.map(|d| d.to_string()).unwrap_or_default(),
                    }),
                    _ => None,
                })
                .collect();
            output::print_list(&rows, format);
        }
        ListCommands::Todos(args) => {
            let page = store
                .query_prefix(&args.namespace, ItemType::Todo, None, args.limit)
                .await?;
            let mut rows: Vec<TodoRow> = page
                .items
                .iter()
                .filter_map(|r| match r {
                    EntityRecord::Todo(t) => Some(TodoRow {
                        order: t.order,
                        text: output::truncate(&t.text, 48),
                        completed: t.completed,
                    }),
                    _ => None,
                })
                .collect();
            rows.sort_by_key(|r| r.order);
            output::print_list(&rows, format);
        }
        ListCommands::Reminders(args) => {
            // The due sweep reads the secondary index, time-ordered; the
            // plain listing walks the primary prefix.
            let page = if args.due {
                store.query_index("due#pending", None, args.base.limit).await?
            } else {
                store
                    .query_prefix(&args.base.namespace, ItemType::Reminder, None, args.base.limit)
                    .await?
            };
            let rows: Vec<ReminderRow> = page
                .items
                .iter()
                .filter_map(|r| match r {
                    EntityRecord::Reminder(rem) if rem.namespace == args.base.namespace => {
                        Some(ReminderRow {
                            id: rem.reminder_id.to_string(),
                            title: output::truncate(&rem.title, 40),
                            scheduled_for: rem.scheduled_for.to_rfc3339(),
                            status: rem.status.to_string(),
                            recurrence: rem.recurrence.to_string(),
                        })
                    }
                    _ => None,
                })
                .collect();
            output::print_list(&rows, format);
        }
    }
    Ok(())
}
