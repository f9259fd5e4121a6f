use std::fs;

use pretty_assertions::assert_eq;
use sweep_engine::{
    read_frames, ticket_rows_from_document, AuditRowExtractor, HtmlFrameSurface, JobProgress,
    ProgressSink, RowFilter, SweepContext, SweepPlan, SweepSettings, Sweeper, Termination,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _progress: JobProgress) {}
}

fn audit_row(name: &str, date: &str) -> String {
    format!(
        r#"<tr data-testid="resource-table-row">
            <td data-testid="resource-table-column"><input type="checkbox"></td>
            <td data-testid="resource-table-column">
                <span class="Text_color_primary">{name}</span>
                <span class="Text_color_secondary">{name}@example.com</span>
            </td>
            <td data-testid="resource-table-column">{date}</td>
            <td data-testid="resource-table-column">Login</td>
        </tr>"#
    )
}

/// A virtualized table only keeps a window of rows rendered.
fn audit_frame(window: &[(&str, &str)]) -> String {
    let rows: String = window.iter().map(|(n, d)| audit_row(n, d)).collect();
    format!(r#"<html><body><div class="audit"><table><tbody>{rows}</tbody></table></div></body></html>"#)
}

#[tokio::test]
async fn replayed_virtualized_table_is_collected_once_per_row() {
    let people = [
        ("ann", "01.03"),
        ("bob", "02.03"),
        ("cid", "03.03"),
        ("dee", "04.03"),
        ("eve", "05.03"),
    ];
    let frames = vec![
        audit_frame(&people[0..2]),
        audit_frame(&people[1..3]),
        audit_frame(&people[2..4]),
        audit_frame(&people[3..5]),
    ];
    let surface = HtmlFrameSurface::new(frames, ".audit", r#"tr[data-testid="resource-table-row"]"#).unwrap();
    let settings = SweepSettings {
        bottom_threshold: 3,
        ..SweepSettings::default().without_delays()
    };
    let sweeper = Sweeper::new(surface, AuditRowExtractor::default(), settings, SweepPlan::default());
    let cancel = CancellationToken::new();

    let report = sweeper
        .run(&SweepContext {
            target: 1,
            cancel: &cancel,
            sink: &NullSink,
        })
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Converged);
    let names: Vec<&str> = report
        .records
        .iter()
        .filter_map(|r| r.get("employee"))
        .collect();
    assert_eq!(names, vec!["ann", "bob", "cid", "dee", "eve"]);
    assert_eq!(report.iterations, 3 + 3);
}

#[test]
fn frames_are_read_in_name_order() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("002.html"), "second").unwrap();
    fs::write(temp.path().join("001.html"), "first").unwrap();
    fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

    assert_eq!(read_frames(temp.path()).unwrap(), vec!["first", "second"]);
}

#[test]
fn ticket_rows_hidden_by_subject_and_status() {
    let html = r#"<table><tbody>
        <tr data-testid="resource-table-row">
            <td><span data-testid="orb-text">Без темы</span></td>
            <td><div data-testid="ticket-status-tag"><span class="Orb-Tag-label">Открыто</span></div></td>
        </tr>
        <tr data-testid="resource-table-row">
            <td><span data-testid="orb-text">Printer broken</span></td>
            <td><div data-testid="ticket-status-tag"><span class="Orb-Tag-label">Архивировано</span></div></td>
        </tr>
        <tr data-testid="resource-table-row">
            <td><span data-testid="orb-text">VPN access</span></td>
        </tr>
    </tbody></table>"#;
    let rows = ticket_rows_from_document(html);
    assert_eq!(rows.len(), 3);

    let filter = RowFilter {
        hide_without_subject: true,
        hide_archived: true,
    };
    let stats = filter.stats(&rows);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.hidden_no_subject, 1);
    assert_eq!(stats.hidden_archived, 1);
    assert_eq!(stats.visible, 1);
}
