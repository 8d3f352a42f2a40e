use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, Command, CompletionCommand, DoneArgs, ModifyArgs};
use crate::datastore::DataStore;
use crate::datetime::{format_relative, parse_date_expr};
use crate::render::Renderer;
use crate::task::{CompletionPatch, Patch, TaskDraft, TaskPatch};
use crate::view::{StatusReport, overdue_notifications};

/// Per-invocation state handed to every command.
pub struct CommandContext<'a> {
    pub store: &'a DataStore,
    pub renderer: &'a mut Renderer,
    pub tz: Tz,
    pub now: DateTime<Utc>,
}

#[instrument(skip(ctx, command))]
pub fn dispatch(ctx: &mut CommandContext<'_>, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(ctx, args),
        Command::List { all } => cmd_list(ctx, all),
        Command::Info { id } => cmd_info(ctx, id),
        Command::Modify(args) => cmd_modify(ctx, args),
        Command::Archive { id } => cmd_set_archived(ctx, id, true),
        Command::Unarchive { id } => cmd_set_archived(ctx, id, false),
        Command::Delete { id } => cmd_delete(ctx, id),
        Command::Done(args) => cmd_done(ctx, args),
        Command::Completion(sub) => cmd_completion(ctx, sub),
        Command::Overdue => cmd_overdue(ctx),
        Command::Export { all } => cmd_export(ctx, all),
    }
}

#[instrument(skip(ctx, args))]
fn cmd_add(ctx: &mut CommandContext<'_>, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let draft = TaskDraft {
        name: args.name,
        description: args.description,
        interval_days: args.interval_days,
        notifications_enabled: Some(!args.no_notify),
    };
    let task = ctx.store.create_task(draft, ctx.now)?;

    println!("Created chore {}.", task.id);
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_list(ctx: &mut CommandContext<'_>, include_archived: bool) -> anyhow::Result<()> {
    info!("command list");

    let views = ctx.store.list_views(include_archived)?;
    ctx.renderer.print_overdue_banner(&views, ctx.now)?;
    ctx.renderer.print_task_table(&views, ctx.now)?;
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_info(ctx: &mut CommandContext<'_>, id: u64) -> anyhow::Result<()> {
    info!("command info");

    let task = ctx.store.find_task(id)?;
    let history = ctx.store.completions_for(task.uuid)?;
    ctx.renderer.print_task_info(&task, &history, ctx.now)?;
    Ok(())
}

#[instrument(skip(ctx, args))]
fn cmd_modify(ctx: &mut CommandContext<'_>, args: ModifyArgs) -> anyhow::Result<()> {
    info!("command modify");

    let patch = modify_patch(args.clone());
    if patch.is_empty() {
        return Err(anyhow!("modify requires at least one field to change"));
    }

    let task = ctx.store.update_task(args.id, patch, ctx.now)?;
    println!("Modified chore {}.", task.id);
    Ok(())
}

fn modify_patch(args: ModifyArgs) -> TaskPatch {
    let description = if args.clear_description {
        Patch::Clear
    } else {
        args.description.map(Patch::Set).unwrap_or_default()
    };
    let interval_days = if args.clear_interval {
        Patch::Clear
    } else {
        args.interval_days.map(Patch::Set).unwrap_or_default()
    };

    TaskPatch {
        name: args.name,
        description,
        interval_days,
        notifications_enabled: args.notify.map(|t| t.enabled()),
        is_archived: None,
    }
}

#[instrument(skip(ctx))]
fn cmd_set_archived(ctx: &mut CommandContext<'_>, id: u64, archived: bool) -> anyhow::Result<()> {
    info!(archived, "command archive");

    let patch = TaskPatch {
        is_archived: Some(archived),
        ..TaskPatch::default()
    };
    let task = ctx.store.update_task(id, patch, ctx.now)?;

    if archived {
        println!("Archived chore {} '{}'.", task.id, task.name);
    } else {
        println!("Restored chore {} '{}'.", task.id, task.name);
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_delete(ctx: &mut CommandContext<'_>, id: u64) -> anyhow::Result<()> {
    info!("command delete");

    let task = ctx.store.delete_task(id)?;
    println!("Deleted chore {} '{}' and its history.", task.id, task.name);
    Ok(())
}

#[instrument(skip(ctx, args))]
fn cmd_done(ctx: &mut CommandContext<'_>, args: DoneArgs) -> anyhow::Result<()> {
    info!("command done");

    let completed_at = match args.at.as_deref() {
        Some(expr) => parse_date_expr(expr, ctx.now, &ctx.tz)?,
        None => ctx.now,
    };
    let completion = ctx
        .store
        .create_completion(args.id, completed_at, args.note)?;

    println!(
        "Logged chore {} as done {} ({}).",
        args.id,
        format_relative(completion.completed_at, ctx.now).to_lowercase(),
        completion.short_ref()
    );
    Ok(())
}

#[instrument(skip(ctx, sub))]
fn cmd_completion(ctx: &mut CommandContext<'_>, sub: CompletionCommand) -> anyhow::Result<()> {
    match sub {
        CompletionCommand::Edit {
            reference,
            at,
            note,
            clear_note,
        } => {
            info!("command completion edit");

            let completed_at = at
                .as_deref()
                .map(|expr| parse_date_expr(expr, ctx.now, &ctx.tz))
                .transpose()?;
            let notes = if clear_note {
                Patch::Clear
            } else {
                note.map(Patch::Set).unwrap_or_default()
            };
            let patch = CompletionPatch {
                completed_at,
                notes,
            };
            if patch.is_empty() {
                return Err(anyhow!("completion edit requires --at, --note or --clear-note"));
            }

            let completion = ctx.store.update_completion(&reference, patch)?;
            println!("Updated completion {}.", completion.short_ref());
            Ok(())
        }
        CompletionCommand::Delete { reference } => {
            info!("command completion delete");

            let completion = ctx.store.delete_completion(&reference)?;
            println!("Deleted completion {}.", completion.short_ref());
            Ok(())
        }
    }
}

#[instrument(skip(ctx))]
fn cmd_overdue(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    info!("command overdue");

    let views = ctx.store.list_views(false)?;
    let overdue = overdue_notifications(&views, ctx.now);
    if overdue.is_empty() {
        println!("Nothing overdue.");
        return Ok(());
    }

    for view in overdue {
        let last = view
            .last_completion
            .as_ref()
            .map(|c| format_relative(c.completed_at, ctx.now))
            .unwrap_or_else(|| "never".to_string());
        println!("{:>4}  {}  (last done: {last})", view.task.id, view.task.name);
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_export(ctx: &mut CommandContext<'_>, include_archived: bool) -> anyhow::Result<()> {
    info!("command export");

    let rows: Vec<StatusReport> = ctx
        .store
        .list_views(include_archived)?
        .into_iter()
        .map(|view| StatusReport::new(view, ctx.now))
        .collect();

    let out = serde_json::to_string(&rows)?;
    println!("{out}");
    Ok(())
}
