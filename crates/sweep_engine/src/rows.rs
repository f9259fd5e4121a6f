use scraper::Html;

use crate::extract::{static_selector, text_of};

/// Text the ticket table shows in place of an empty subject.
pub const NO_SUBJECT_MARKER: &str = "Без темы";
/// Status tag label of archived tickets.
pub const ARCHIVED_MARKER: &str = "Архивировано";

/// One support-ticket table row, reduced to what the filter looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicketRow {
    pub texts: Vec<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowVisibility {
    pub no_subject: bool,
    pub archived: bool,
}

impl RowVisibility {
    pub fn is_hidden(&self) -> bool {
        self.no_subject || self.archived
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowStats {
    pub total: usize,
    pub hidden_no_subject: usize,
    pub hidden_archived: usize,
    pub visible: usize,
}

/// Visibility toggles for the ticket list. Both off means nothing is hidden.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowFilter {
    pub hide_without_subject: bool,
    pub hide_archived: bool,
}

impl RowFilter {
    pub fn is_active(&self) -> bool {
        self.hide_without_subject || self.hide_archived
    }

    /// Matches are exact after trimming; a subject that merely mentions the marker stays visible.
    pub fn evaluate(&self, row: &TicketRow) -> RowVisibility {
        RowVisibility {
            no_subject: self.hide_without_subject
                && row.texts.iter().any(|text| text.trim() == NO_SUBJECT_MARKER),
            archived: self.hide_archived
                && row
                    .status
                    .as_deref()
                    .is_some_and(|status| status.trim() == ARCHIVED_MARKER),
        }
    }

    /// A row matching both rules counts toward both hidden totals, once as hidden.
    pub fn stats<'a>(&self, rows: impl IntoIterator<Item = &'a TicketRow>) -> RowStats {
        let mut stats = RowStats::default();
        for row in rows {
            let visibility = self.evaluate(row);
            stats.total += 1;
            stats.hidden_no_subject += usize::from(visibility.no_subject);
            stats.hidden_archived += usize::from(visibility.archived);
            if !visibility.is_hidden() {
                stats.visible += 1;
            }
        }
        stats
    }
}

pub fn ticket_rows_from_document(html: &str) -> Vec<TicketRow> {
    let row_selector = static_selector(r#"tr[data-testid="resource-table-row"]"#);
    let text_selector = static_selector(r#"[data-testid="orb-text"]"#);
    let status_selector = static_selector(r#"[data-testid="ticket-status-tag"] .Orb-Tag-label"#);

    let doc = Html::parse_document(html);
    doc.select(&row_selector)
        .map(|row| TicketRow {
            texts: row.select(&text_selector).map(text_of).collect(),
            status: row.select(&status_selector).next().map(text_of),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(texts: &[&str], status: Option<&str>) -> TicketRow {
        TicketRow {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn inactive_filter_hides_nothing() {
        let filter = RowFilter::default();
        assert!(!filter.is_active());
        assert!(!filter
            .evaluate(&row(&[NO_SUBJECT_MARKER], Some(ARCHIVED_MARKER)))
            .is_hidden());
    }

    #[test]
    fn partial_subject_match_stays_visible() {
        let filter = RowFilter {
            hide_without_subject: true,
            hide_archived: false,
        };
        assert!(filter.evaluate(&row(&["  Без темы "], None)).no_subject);
        assert!(!filter
            .evaluate(&row(&["Re: Без темы обращения"], None))
            .is_hidden());
    }
}
