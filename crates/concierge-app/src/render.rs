//! Plain-text rendering of session snapshots for the terminal.

use std::fmt::Write;

use chrono::Local;
use serde_json::Value;

use concierge_chat::SessionSnapshot;
use concierge_core::{ConversationSummary, Message, ReportResult, Role};

pub fn message(message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "tú",
        Role::Assistant => "asistente",
    };
    let mut out = format!("{}: {}", speaker, message.content);
    for action in &message.suggested_actions {
        let _ = write!(out, "\n    → {} ({})", action.label, action.url);
    }
    for resource in &message.related_resources {
        let _ = write!(out, "\n    📄 {}: {}", resource.title, resource.url);
    }
    out
}

/// Numbered history list, newest first as the server ordered it.
pub fn conversations(list: &[ConversationSummary]) -> String {
    if list.is_empty() {
        return "No hay conversaciones anteriores.".to_string();
    }
    let mut out = String::new();
    for (i, c) in list.iter().enumerate() {
        let when = c.last_message_at.with_timezone(&Local).format("%d/%m %H:%M");
        let _ = write!(
            out,
            "{:>2}. {} ({} mensajes, {})",
            i + 1,
            c.title,
            c.message_count,
            when
        );
        if let Some(preview) = &c.last_message_preview {
            let _ = write!(out, "\n      {}", truncate(&preview.content, 60));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Quick actions and suggestions, shown while the conversation is empty.
pub fn hints(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    if !snapshot.quick_actions.is_empty() {
        out.push_str("Accesos rápidos:");
        for action in &snapshot.quick_actions {
            let _ = write!(out, "\n  {} ({})", action.label, action.url);
        }
    }
    if !snapshot.suggestions.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("Preguntas sugeridas:");
        for (i, s) in snapshot.suggestions.iter().enumerate() {
            let _ = write!(out, "\n  {}. {}", i + 1, s);
        }
    }
    out
}

/// Summary, interpretation and an aligned table.
pub fn report(report: &ReportResult) -> String {
    let mut out = String::new();
    let i = &report.interpretation;
    let _ = writeln!(
        out,
        "Consulta: {}\nInterpretación: {} · {} · {} · {}",
        report.query, i.kind, i.entity, i.period, i.metric
    );

    let rows: Vec<Vec<String>> = (0..report.data.len())
        .map(|r| {
            (0..report.columns.len())
                .map(|c| report.cell(r, c).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();
    let widths: Vec<usize> = report
        .columns
        .iter()
        .enumerate()
        .map(|(c, header)| {
            rows.iter()
                .map(|row| row[c].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    // Trailing empty cells are dropped and the last cell is never padded.
    let line = |cells: &[String]| -> String {
        let used = cells
            .iter()
            .rposition(|text| !text.is_empty())
            .map_or(0, |last| last + 1);
        let mut parts: Vec<String> = cells[..used]
            .iter()
            .zip(&widths)
            .map(|(text, width)| format!("{:<width$}", text, width = *width))
            .collect();
        if let (Some(last), Some(text)) = (parts.last_mut(), cells[..used].last()) {
            *last = text.clone();
        }
        parts.join(" | ")
    };
    let _ = writeln!(out, "{}", line(&report.columns));
    let _ = writeln!(
        out,
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &rows {
        let _ = writeln!(out, "{}", line(row));
    }
    if !report.summary.is_empty() {
        let _ = write!(out, "\n{}", report.summary);
    }
    out.trim_end().to_string()
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}
