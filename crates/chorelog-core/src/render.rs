use std::io::{self, IsTerminal, Write};

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{
    format_absolute_date, format_date_time, format_input_datetime, format_relative,
    interval_label,
};
use crate::status::{Status, classify};
use crate::task::{Completion, Task};
use crate::view::{TaskWithLastCompletion, overdue_notifications};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color = cfg
            .get_bool("color")
            .context("invalid color setting")?
            .unwrap_or(true);

        Ok(Self { color, tz })
    }

    #[tracing::instrument(skip(self, views, now))]
    pub fn print_task_table(
        &mut self,
        views: &[TaskWithLastCompletion],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_task_table(out, views, now)
    }

    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        views: &[TaskWithLastCompletion],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if views.is_empty() {
            writeln!(out, "No chores yet. Add one with `chores add <name>`.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Status".to_string(),
            "Name".to_string(),
            "Last done".to_string(),
            "Interval".to_string(),
        ];

        let mut rows = Vec::with_capacity(views.len());

        for view in views {
            let status = view.status(now);
            let id = self.paint(&view.task.id.to_string(), "33");
            let status_cell = self.paint(status.as_str(), status_color(status));

            let mut name = view.task.name.clone();
            if view.task.is_archived {
                name.push_str(" (archived)");
            }

            let last_done = view
                .last_completion
                .as_ref()
                .map(|c| format_relative(c.completed_at, now))
                .unwrap_or_else(|| "Never".to_string());

            let interval = if view.task.interval_days.is_some() {
                view.interval_label()
            } else {
                String::new()
            };

            rows.push(vec![id, status_cell, name, last_done, interval]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, views, now))]
    pub fn print_overdue_banner(
        &mut self,
        views: &[TaskWithLastCompletion],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_overdue_banner(out, views, now)
    }

    /// Writes nothing when no notifying chore is overdue.
    pub fn write_overdue_banner<W: Write>(
        &self,
        mut out: W,
        views: &[TaskWithLastCompletion],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let overdue = overdue_notifications(views, now);
        if overdue.is_empty() {
            return Ok(());
        }

        let noun = if overdue.len() == 1 { "task" } else { "tasks" };
        let heading = format!("{} {noun} overdue", overdue.len());
        writeln!(out, "{}", self.paint(&heading, status_color(Status::Overdue)))?;
        for view in overdue {
            writeln!(out, "  - {}", view.task.name)?;
        }
        writeln!(out)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, history, now), fields(id = task.id))]
    pub fn print_task_info(
        &mut self,
        task: &Task,
        history: &[Completion],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_task_info(out, task, history, now)
    }

    /// `history` is expected newest first.
    pub fn write_task_info<W: Write>(
        &self,
        mut out: W,
        task: &Task,
        history: &[Completion],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let status = classify(task.interval_days, history.first(), now);

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "uuid      {}", task.uuid)?;
        writeln!(out, "name      {}", task.name)?;
        if let Some(description) = &task.description {
            writeln!(out, "desc      {description}")?;
        }
        writeln!(out, "interval  {}", interval_label(task.interval_days))?;
        writeln!(
            out,
            "status    {}",
            self.paint(status.as_str(), status_color(status))
        )?;
        writeln!(
            out,
            "notify    {}",
            if task.notifications_enabled { "on" } else { "off" }
        )?;
        if task.is_archived {
            writeln!(out, "archived  yes")?;
        }
        writeln!(
            out,
            "created   {}",
            format_absolute_date(task.created_at, &self.tz)
        )?;
        writeln!(
            out,
            "updated   {}",
            format_absolute_date(task.updated_at, &self.tz)
        )?;

        match history.first() {
            Some(last) => writeln!(
                out,
                "last done {} ({})",
                format_relative(last.completed_at, now),
                format_absolute_date(last.completed_at, &self.tz)
            )?,
            None => writeln!(out, "last done never")?,
        }

        if history.is_empty() {
            return Ok(());
        }

        writeln!(out)?;
        let headers = vec![
            "Ref".to_string(),
            "Done".to_string(),
            "At".to_string(),
            "Notes".to_string(),
        ];
        let rows = history
            .iter()
            .map(|c| {
                vec![
                    self.paint(&c.short_ref(), "33"),
                    format_date_time(c.completed_at, &self.tz),
                    format_input_datetime(c.completed_at, &self.tz),
                    c.notes.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn status_color(status: Status) -> &'static str {
    match status {
        Status::Good => "32",
        Status::Warning => "33",
        Status::Overdue => "31",
        Status::Neutral => "90",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::task::TaskDraft;
    use crate::view::assemble;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 20, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn plain_renderer() -> Renderer {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "off".to_string())]);
        Renderer::new(&cfg, chrono_tz::UTC).expect("renderer")
    }

    fn chore(id: u64, name: &str, interval: Option<u32>) -> Task {
        Task::from_draft(
            TaskDraft {
                name: name.to_string(),
                interval_days: interval,
                ..TaskDraft::default()
            },
            now() - Duration::days(60) + Duration::minutes(id as i64),
            id,
        )
        .expect("valid chore")
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn rejects_unknown_color_setting() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "sometimes".to_string())]);
        assert!(Renderer::new(&cfg, chrono_tz::UTC).is_err());
    }

    #[test]
    fn table_shows_status_last_done_and_interval() {
        let water = chore(1, "Water plants", Some(14));
        let call = chore(2, "Call grandma", None);
        let done = Completion::new(water.uuid, now() - Duration::days(3), None);
        let views = assemble(&[water, call], &[done], false);

        let renderer = plain_renderer();
        let text = render(|buf| renderer.write_task_table(buf, &views, now()));

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ID "));
        assert!(lines[1].starts_with("--"));
        assert!(lines[2].contains("neutral"));
        assert!(lines[2].contains("Call grandma"));
        assert!(lines[2].contains("Never"));
        assert!(lines[3].contains("good"));
        assert!(lines[3].contains("3 days ago"));
        assert!(lines[3].contains("Every 2 weeks"));
    }

    #[test]
    fn empty_table_prints_hint() {
        let renderer = plain_renderer();
        let text = render(|buf| renderer.write_task_table(buf, &[], now()));
        assert!(text.contains("No chores yet"));
    }

    #[test]
    fn banner_counts_only_notifying_overdue() {
        let trash = chore(1, "Take out trash", Some(3));
        let mut filter = chore(2, "Replace filter", Some(30));
        filter.notifications_enabled = false;
        let views = assemble(&[trash, filter], &[], false);

        let renderer = plain_renderer();
        let text = render(|buf| renderer.write_overdue_banner(buf, &views, now()));
        assert!(text.starts_with("1 task overdue\n"));
        assert!(text.contains("  - Take out trash"));
        assert!(!text.contains("Replace filter"));
    }

    #[test]
    fn banner_is_silent_when_nothing_overdue() {
        let renderer = plain_renderer();
        let views = assemble(&[chore(1, "Read", None)], &[], false);
        let text = render(|buf| renderer.write_overdue_banner(buf, &views, now()));
        assert!(text.is_empty());
    }

    #[test]
    fn info_lists_history_newest_first() {
        let task = chore(1, "Clean fridge", Some(30));
        let older = Completion::new(
            task.uuid,
            Utc.with_ymd_and_hms(2026, 1, 10, 19, 0, 0)
                .single()
                .expect("valid"),
            Some("deep clean".to_string()),
        );
        let newer = Completion::new(task.uuid, now() - Duration::days(1), None);
        let history = vec![newer, older.clone()];

        let renderer = plain_renderer();
        let text = render(|buf| renderer.write_task_info(buf, &task, &history, now()));

        assert!(text.contains("interval  Every month"));
        assert!(text.contains("status    good"));
        assert!(text.contains("last done Yesterday (Jan 19, 2026)"));
        assert!(text.contains("7PM Sat 1/10/26"));
        assert!(text.contains("2026-01-10T19:00"));
        assert!(text.contains("deep clean"));
        assert!(text.contains(&older.short_ref()));
    }
}
