//! Question → answer → reply threading for broadcast chat exports.
//!
//! The chat only shows a sender name on other people's messages, and reply
//! previews quote the question author by display name. Who "you" are is
//! therefore inferred from reply previews that quote your own questions.
//! That inference is best effort: when nothing links the two, own messages
//! get the fallback name.

use std::collections::HashMap;

use sweep_core::Record;

pub const THREAD_HEADERS: [&str; 10] = [
    "№",
    "Время вопроса",
    "Автор вопроса",
    "Вопрос",
    "Время ответа",
    "Автор ответа",
    "Ответ",
    "Время ответа на ответ",
    "Автор ответа на ответ",
    "Ответ на ответ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Question,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub time: String,
    pub sender: String,
    pub own: bool,
    pub kind: MessageKind,
    pub text: String,
    /// Quoted author and text; empty for questions.
    pub question_author: String,
    pub question_text: String,
}

impl ChatMessage {
    /// Reads a record produced by `ChatMessageExtractor`.
    pub fn from_record(record: &Record) -> Option<Self> {
        let field = |name: &str| record.get(name).unwrap_or_default().to_string();
        let kind = match record.get("kind")? {
            "question" => MessageKind::Question,
            "answer" => MessageKind::Answer,
            _ => return None,
        };
        Some(Self {
            id: record.identity().to_string(),
            time: field("time"),
            sender: field("sender"),
            own: record.get("own") == Some("true"),
            kind,
            text: field("message"),
            question_author: field("question_author"),
            question_text: field("question_text"),
        })
    }

    fn is_question(&self) -> bool {
        self.kind == MessageKind::Question
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Fills in missing senders. Returns the inferred name of the exporting user, if any.
pub fn reconcile_senders(messages: &mut [ChatMessage], fallback: &str) -> Option<String> {
    let own_name = infer_own_name(messages);

    let mut question_authors: HashMap<String, String> = HashMap::new();
    for msg in messages.iter().filter(|m| !m.is_question()) {
        if !msg.question_text.is_empty() && !msg.question_author.is_empty() {
            question_authors
                .entry(normalize(&msg.question_text))
                .or_insert_with(|| msg.question_author.clone());
        }
    }

    for msg in messages.iter_mut().filter(|m| m.sender.is_empty()) {
        msg.sender = match (&own_name, msg.own) {
            (Some(name), true) => name.clone(),
            _ if msg.is_question() => question_authors
                .get(&normalize(&msg.text))
                .cloned()
                .unwrap_or_else(|| fallback.to_string()),
            _ => fallback.to_string(),
        };
    }
    own_name
}

fn infer_own_name(messages: &[ChatMessage]) -> Option<String> {
    let own_questions: Vec<String> = messages
        .iter()
        .filter(|m| m.is_question() && m.own)
        .map(|m| normalize(&m.text))
        .collect();

    // Someone else answered one of our questions: the preview names us.
    let from_answers = messages
        .iter()
        .filter(|m| !m.is_question() && !m.own && !m.sender.is_empty())
        .filter(|m| !m.question_author.is_empty())
        .find(|m| own_questions.contains(&normalize(&m.question_text)))
        .map(|m| m.question_author.clone());
    if from_answers.is_some() {
        return from_answers;
    }

    messages
        .iter()
        .filter(|m| m.is_question() && m.own && m.sender.is_empty())
        .find_map(|question| {
            let text = normalize(&question.text);
            messages
                .iter()
                .find(|m| {
                    !m.is_question()
                        && !m.question_author.is_empty()
                        && normalize(&m.question_text) == text
                })
                .map(|m| m.question_author.clone())
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub time: String,
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub time: String,
    pub author: String,
    pub text: String,
    pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionThread {
    pub time: String,
    pub author: String,
    pub text: String,
    pub answers: Vec<Answer>,
}

type ThreadKey = (String, String);

/// Groups messages into threads in collection order.
///
/// Questions are keyed by (normalized text, author); repeated questions
/// collapse into the first. An answer whose quote matches no question but
/// does match an earlier answer becomes a reply to that answer.
pub fn build_threads(messages: &[ChatMessage]) -> Vec<QuestionThread> {
    let mut threads: Vec<QuestionThread> = Vec::new();
    let mut by_key: HashMap<ThreadKey, usize> = HashMap::new();

    for msg in messages.iter().filter(|m| m.is_question()) {
        let key = (normalize(&msg.text), msg.sender.clone());
        by_key.entry(key).or_insert_with(|| {
            threads.push(QuestionThread {
                time: msg.time.clone(),
                author: msg.sender.clone(),
                text: msg.text.clone(),
                answers: Vec::new(),
            });
            threads.len() - 1
        });
    }

    let answers_by_text: HashMap<ThreadKey, &ChatMessage> = messages
        .iter()
        .filter(|m| !m.is_question())
        .map(|m| ((normalize(&m.text), m.sender.clone()), m))
        .collect();

    for msg in messages.iter().filter(|m| !m.is_question()) {
        let quoted = (normalize(&msg.question_text), msg.question_author.clone());
        if let Some(&thread) = by_key.get(&quoted) {
            threads[thread].answers.push(Answer {
                time: msg.time.clone(),
                author: msg.sender.clone(),
                text: msg.text.clone(),
                replies: Vec::new(),
            });
            continue;
        }

        let Some(original) = answers_by_text.get(&quoted) else {
            continue;
        };
        let parent_key = (
            normalize(&original.question_text),
            original.question_author.clone(),
        );
        let Some(&thread) = by_key.get(&parent_key) else {
            continue;
        };
        let original_text = normalize(&original.text);
        if let Some(answer) = threads[thread]
            .answers
            .iter_mut()
            .find(|a| normalize(&a.text) == original_text && a.author == original.sender)
        {
            answer.replies.push(Reply {
                time: msg.time.clone(),
                author: msg.sender.clone(),
                text: msg.text.clone(),
            });
        }
    }

    threads
}

/// One spreadsheet row; cells repeated from the row above are left blank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadRow {
    pub index: usize,
    pub question_time: String,
    pub question_author: String,
    pub question_text: String,
    pub answer_time: String,
    pub answer_author: String,
    pub answer_text: String,
    pub reply_time: String,
    pub reply_author: String,
    pub reply_text: String,
}

impl ThreadRow {
    pub fn cells(&self) -> [String; 10] {
        [
            self.index.to_string(),
            self.question_time.clone(),
            self.question_author.clone(),
            self.question_text.clone(),
            self.answer_time.clone(),
            self.answer_author.clone(),
            self.answer_text.clone(),
            self.reply_time.clone(),
            self.reply_author.clone(),
            self.reply_text.clone(),
        ]
    }
}

pub fn flatten_threads(threads: &[QuestionThread]) -> Vec<ThreadRow> {
    let mut rows = Vec::new();
    for (position, thread) in threads.iter().enumerate() {
        let index = position + 1;
        let question = |show: bool| {
            if show {
                (thread.time.clone(), thread.author.clone(), thread.text.clone())
            } else {
                Default::default()
            }
        };

        if thread.answers.is_empty() {
            let (question_time, question_author, question_text) = question(true);
            rows.push(ThreadRow {
                index,
                question_time,
                question_author,
                question_text,
                ..ThreadRow::default()
            });
            continue;
        }

        for (answer_pos, answer) in thread.answers.iter().enumerate() {
            if answer.replies.is_empty() {
                let (question_time, question_author, question_text) = question(answer_pos == 0);
                rows.push(ThreadRow {
                    index,
                    question_time,
                    question_author,
                    question_text,
                    answer_time: answer.time.clone(),
                    answer_author: answer.author.clone(),
                    answer_text: answer.text.clone(),
                    ..ThreadRow::default()
                });
                continue;
            }
            for (reply_pos, reply) in answer.replies.iter().enumerate() {
                let (question_time, question_author, question_text) =
                    question(answer_pos == 0 && reply_pos == 0);
                let first_reply = reply_pos == 0;
                rows.push(ThreadRow {
                    index,
                    question_time,
                    question_author,
                    question_text,
                    answer_time: if first_reply { answer.time.clone() } else { String::new() },
                    answer_author: if first_reply { answer.author.clone() } else { String::new() },
                    answer_text: if first_reply { answer.text.clone() } else { String::new() },
                    reply_time: reply.time.clone(),
                    reply_author: reply.author.clone(),
                    reply_text: reply.text.clone(),
                });
            }
        }
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadStats {
    pub questions: usize,
    /// Every answer-kind message, replies to answers included.
    pub answers: usize,
}

impl ThreadStats {
    pub fn new(threads: &[QuestionThread], messages: &[ChatMessage]) -> Self {
        Self {
            questions: threads.len(),
            answers: messages.iter().filter(|m| !m.is_question()).count(),
        }
    }
}
