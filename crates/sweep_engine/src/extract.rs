use scraper::{ElementRef, Html, Selector};
use sweep_core::Record;
use url::Url;

/// Result of turning one rendered node into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Record(Record),
    /// A valid node that carries no data (system message, placeholder row).
    Skip,
    /// Expected sub-elements are missing; the node is dropped, never half-collected.
    Malformed(String),
}

pub trait RecordExtractor<N>: Send + Sync {
    fn extract(&self, node: &N) -> Extracted;
}

/// Outer HTML of one rendered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlNode {
    html: String,
}

impl HtmlNode {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Parses the node as a fragment. Table parts are re-wrapped in their
    /// parents, otherwise the HTML parser drops them in body context.
    pub(crate) fn parse(&self) -> Html {
        let trimmed = self.html.trim_start();
        let lowered = trimmed.get(..4).unwrap_or(trimmed).to_ascii_lowercase();
        if lowered.starts_with("<tr") {
            Html::parse_fragment(&format!("<table><tbody>{trimmed}</tbody></table>"))
        } else if lowered.starts_with("<td") || lowered.starts_with("<th") {
            Html::parse_fragment(&format!("<table><tbody><tr>{trimmed}</tr></tbody></table>"))
        } else {
            Html::parse_fragment(trimmed)
        }
    }
}

pub(crate) fn static_selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rows of the admin audit log table.
///
/// Identity is the composite of the visible cells because the table exposes
/// no stable row id.
pub struct AuditRowExtractor {
    cell: Selector,
    primary: Selector,
    secondary: Selector,
}

impl Default for AuditRowExtractor {
    fn default() -> Self {
        Self {
            cell: static_selector(r#"td[data-testid="resource-table-column"]"#),
            primary: static_selector(".Text_color_primary"),
            secondary: static_selector(".Text_color_secondary"),
        }
    }
}

impl RecordExtractor<HtmlNode> for AuditRowExtractor {
    fn extract(&self, node: &HtmlNode) -> Extracted {
        let doc = node.parse();
        let cells: Vec<ElementRef<'_>> = doc.select(&self.cell).collect();
        if cells.len() < 4 {
            return Extracted::Malformed(format!("expected 4 cells, found {}", cells.len()));
        }

        let employee_cell = cells[1];
        let employee = employee_cell
            .select(&self.primary)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let email = employee_cell
            .select(&self.secondary)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let date = text_of(cells[2]);
        let event = text_of(cells[3]);

        if employee.is_empty() && email.is_empty() && date.is_empty() && event.is_empty() {
            return Extracted::Skip;
        }

        let identity = format!("{employee}\u{1f}{email}\u{1f}{date}\u{1f}{event}");
        Extracted::Record(
            Record::new(identity)
                .with_field("employee", employee)
                .with_field("email", email)
                .with_field("date", date)
                .with_field("event", event),
        )
    }
}

/// Messages of a broadcast chat. Identity is the DOM-provided message id.
pub struct ChatMessageExtractor {
    article: Selector,
    system: Selector,
    text: Selector,
    time: Selector,
    own: Selector,
    user: Selector,
    user_name: Selector,
    reply: Selector,
    reply_title: Selector,
    reply_description: Selector,
}

impl Default for ChatMessageExtractor {
    fn default() -> Self {
        Self {
            article: static_selector("article"),
            system: static_selector(".yamb-message-system"),
            text: static_selector(r#"span[data-copyable="true"]"#),
            time: static_selector(".yamb-message-info__time"),
            own: static_selector(".yamb-message-row_own"),
            user: static_selector(".yamb-message-user"),
            user_name: static_selector(".yamb-message-user__name"),
            reply: static_selector(".yamb-message-reply"),
            reply_title: static_selector(".yamb-message-reply__title"),
            reply_description: static_selector(".yamb-message-reply__description"),
        }
    }
}

impl RecordExtractor<HtmlNode> for ChatMessageExtractor {
    fn extract(&self, node: &HtmlNode) -> Extracted {
        let doc = node.parse();
        let Some(article) = doc.select(&self.article).next() else {
            return Extracted::Malformed("no article element".to_string());
        };
        let Some(id) = article
            .value()
            .attr("aria-labelledby")
            .and_then(|labels| labels.split_whitespace().next())
        else {
            return Extracted::Malformed("message without id".to_string());
        };
        if article.select(&self.system).next().is_some() {
            return Extracted::Skip;
        }
        let Some(text) = article.select(&self.text).next().map(text_of) else {
            return Extracted::Malformed(format!("message {id} has no text"));
        };

        let time = article
            .select(&self.time)
            .next()
            .map(|el| {
                el.value()
                    .attr("aria-label")
                    .map(str::to_string)
                    .unwrap_or_else(|| text_of(el))
            })
            .unwrap_or_default();
        let own = article.select(&self.own).next().is_some();
        let sender = article
            .select(&self.user)
            .next()
            .map(|user| match user.value().attr("aria-label") {
                Some(label) if !label.trim().is_empty() => label.trim().to_string(),
                _ => user
                    .select(&self.user_name)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let (kind, question_author, question_text) = match article.select(&self.reply).next() {
            Some(reply) => (
                "answer",
                reply
                    .select(&self.reply_title)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
                reply
                    .select(&self.reply_description)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
            ),
            None => ("question", String::new(), String::new()),
        };

        Extracted::Record(
            Record::new(id)
                .with_field("id", id)
                .with_field("time", time)
                .with_field("sender", sender)
                .with_field("own", own.to_string())
                .with_field("kind", kind)
                .with_field("message", text)
                .with_field("question_author", question_author)
                .with_field("question_text", question_text),
        )
    }
}

/// Links of a collapsible navigation tree. Identity is the resolved href.
pub struct NavLinkExtractor {
    anchor: Selector,
    base: Option<Url>,
}

impl NavLinkExtractor {
    pub fn new(base: Option<Url>) -> Self {
        Self {
            anchor: static_selector("a"),
            base,
        }
    }

    fn resolve(&self, href: &str) -> String {
        match &self.base {
            Some(base) => base
                .join(href)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        }
    }
}

impl Default for NavLinkExtractor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RecordExtractor<HtmlNode> for NavLinkExtractor {
    fn extract(&self, node: &HtmlNode) -> Extracted {
        let doc = node.parse();
        let Some(anchor) = doc.select(&self.anchor).next() else {
            return Extracted::Malformed("no anchor element".to_string());
        };
        let href = anchor.value().attr("href").unwrap_or("").trim();
        // The tree root links back to "/", which is not a page of its own.
        if href.is_empty() || href == "/" {
            return Extracted::Skip;
        }
        let url = self.resolve(href);
        Extracted::Record(
            Record::new(url.clone())
                .with_field("href", href)
                .with_field("url", url)
                .with_field("title", text_of(anchor)),
        )
    }
}
