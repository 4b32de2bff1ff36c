//! Context entry model
//!
//! A [`ContextEntry`] is the unit of context the store owns: a file read, a
//! command and its output, a task definition, a task result, and so on.
//! Full text lives behind an `Arc<str>` so views can project it without
//! copying, and is dropped on compression while the summary stays.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of context an entry carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Contents of a file
    File,
    /// A command line that was run
    Command,
    /// Output of a command
    CommandResult,
    /// A task definition
    Task,
    /// Output produced for a task
    TaskResult,
    /// Results of a search
    SearchResult,
    /// A summary written by an agent
    Summary,
    /// A request for more context
    ContextRequest,
}

impl EntryType {
    /// Every entry type, in declaration order
    pub const ALL: [Self; 8] = [
        Self::File,
        Self::Command,
        Self::CommandResult,
        Self::Task,
        Self::TaskResult,
        Self::SearchResult,
        Self::Summary,
        Self::ContextRequest,
    ];

    /// Canonical upper-case name, matching the serialized form
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Command => "COMMAND",
            Self::CommandResult => "COMMAND_RESULT",
            Self::Task => "TASK",
            Self::TaskResult => "TASK_RESULT",
            Self::SearchResult => "SEARCH_RESULT",
            Self::Summary => "SUMMARY",
            Self::ContextRequest => "CONTEXT_REQUEST",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no entry type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown entry type: {0}")]
pub struct ParseEntryTypeError(pub String);

impl FromStr for EntryType {
    type Err = ParseEntryTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseEntryTypeError(s.to_string()))
    }
}

/// A single addressable unit of stored context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    id: String,
    entry_type: EntryType,
    source: String,
    content: Option<Arc<str>>,
    summary: String,
    ttl: Option<i64>,
    #[serde(default)]
    sequence: u64,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    compressed: bool,
    #[serde(default)]
    in_use: u32,
}

impl ContextEntry {
    /// Create an entry with no content.
    ///
    /// An entry without content counts as compressed until
    /// [`with_content`](Self::with_content) supplies some.
    pub fn new(
        id: impl Into<String>,
        entry_type: EntryType,
        source: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            entry_type,
            source: source.into(),
            content: None,
            summary: summary.into(),
            ttl: None,
            sequence: 0,
            created_at: Utc::now(),
            compressed: true,
            in_use: 0,
        }
    }

    /// File entry keyed by its path
    pub fn file(path: impl Into<String>, content: impl Into<String>, summary: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(format!("file:{path}"), EntryType::File, path, summary).with_content(content)
    }

    /// Task definition entry; the summary is the first line of the description
    pub fn task(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        let task_id = task_id.into();
        let description = description.into();
        let summary = truncate_summary(description.lines().next().unwrap_or_default(), 120);
        let summary = if summary.is_empty() { format!("Task {task_id}") } else { summary };
        Self::new(format!("task:{task_id}"), EntryType::Task, task_id, summary).with_content(description)
    }

    /// Command line entry; the command text is both source and content
    pub fn command(id: impl Into<String>, command: impl Into<String>) -> Self {
        let command = command.into();
        let summary = truncate_summary(&format!("Ran `{}`", command.trim()), 120);
        Self::new(id, EntryType::Command, command.clone(), summary).with_content(command)
    }

    /// Output of `command`, linked to it through `source`
    pub fn command_result(
        id: impl Into<String>,
        command: impl Into<String>,
        result: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self::new(id, EntryType::CommandResult, command, summary).with_content(result)
    }

    /// Result entry for a task; `source` links back to the task id
    pub fn task_result(
        task_id: impl Into<String>,
        content: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        let task_id = task_id.into();
        Self::new(format!("task-result:{task_id}"), EntryType::TaskResult, task_id, summary)
            .with_content(content)
    }

    /// Attach full content, marking the entry uncompressed
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(Arc::from(content.into()));
        self.compressed = false;
        self
    }

    /// Expire the entry after `turns` lifecycle passes
    pub fn with_ttl(mut self, turns: i64) -> Self {
        self.ttl = Some(turns);
        self
    }

    /// Unique id within a store
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Kind of context carried
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Originating file path, command or task id
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Full text, or `None` once compressed
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Shared handle to the full text
    pub fn shared_content(&self) -> Option<Arc<str>> {
        self.content.clone()
    }

    /// Short description, kept through compression
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Remaining turns before expiry, if any
    pub fn ttl(&self) -> Option<i64> {
        self.ttl
    }

    /// Store-assigned insertion order
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Insertion time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True once the content has been dropped
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Number of outstanding holds
    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    /// True while any hold is outstanding
    pub fn is_held(&self) -> bool {
        self.in_use > 0
    }

    /// True once the TTL has run out
    pub fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| ttl <= 0)
    }

    /// Text the search index embeds: summary, plus content when present
    pub fn indexable_text(&self) -> String {
        match &self.content {
            Some(content) => format!("{}\n{}", self.summary, content),
            None => self.summary.clone(),
        }
    }

    /// Prepare a caller-built entry for insertion.
    ///
    /// Assigns the insertion order, clears any holds carried over from a
    /// snapshot, and re-establishes that missing content means compressed.
    pub fn admit(&mut self, sequence: u64, created_at: DateTime<Utc>) {
        self.sequence = sequence;
        self.created_at = created_at;
        self.in_use = 0;
        self.compressed = self.content.is_none();
    }

    /// Drop the content. Returns false if it was already gone.
    pub fn compress(&mut self) -> bool {
        if self.compressed {
            return false;
        }
        self.content = None;
        self.compressed = true;
        true
    }

    /// Count one lifecycle pass against the TTL, returning what remains
    pub fn tick(&mut self) -> Option<i64> {
        if let Some(ttl) = self.ttl.as_mut() {
            *ttl -= 1;
        }
        self.ttl
    }

    /// Take one hold
    pub fn hold(&mut self) {
        self.in_use += 1;
    }

    /// Release one hold. Returns false if none was outstanding.
    pub fn unhold(&mut self) -> bool {
        if self.in_use == 0 {
            return false;
        }
        self.in_use -= 1;
        true
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_without_content_is_compressed() {
        let entry = ContextEntry::new("s1", EntryType::Summary, "agent", "short note");
        assert!(entry.is_compressed());
        assert_eq!(entry.content(), None);

        let entry = entry.with_content("full body");
        assert!(!entry.is_compressed());
        assert_eq!(entry.content(), Some("full body"));
    }

    #[test]
    fn compress_drops_content_once() {
        let mut entry = ContextEntry::file("src/lib.rs", "pub mod x;", "crate root");
        assert!(entry.compress());
        assert!(!entry.compress());
        assert_eq!(entry.content(), None);
        assert_eq!(entry.summary(), "crate root");
        assert_eq!(entry.indexable_text(), "crate root");
    }

    #[test]
    fn tick_goes_negative_and_reports_expiry() {
        let mut entry = ContextEntry::new("t", EntryType::Task, "x", "y").with_ttl(1);
        assert!(!entry.is_expired());
        assert_eq!(entry.tick(), Some(0));
        assert!(entry.is_expired());
        assert_eq!(entry.tick(), Some(-1));

        let mut forever = ContextEntry::new("f", EntryType::Task, "x", "y");
        assert_eq!(forever.tick(), None);
        assert!(!forever.is_expired());
    }

    #[test]
    fn holds_are_counted() {
        let mut entry = ContextEntry::new("h", EntryType::File, "x", "y");
        entry.hold();
        entry.hold();
        assert_eq!(entry.in_use(), 2);
        assert!(entry.unhold());
        assert!(entry.unhold());
        assert!(!entry.unhold());
        assert!(!entry.is_held());
    }

    #[test]
    fn admit_resets_snapshot_state() {
        let mut entry = ContextEntry::new("a", EntryType::File, "x", "y").with_content("body");
        entry.hold();
        entry.admit(7, Utc::now());
        assert_eq!(entry.sequence(), 7);
        assert_eq!(entry.in_use(), 0);
        assert!(!entry.is_compressed());
    }

    #[test]
    fn task_entry_summarizes_first_line() {
        let entry = ContextEntry::task("t1", "Refactor the parser\nKeep error spans intact");
        assert_eq!(entry.id(), "task:t1");
        assert_eq!(entry.source(), "t1");
        assert_eq!(entry.summary(), "Refactor the parser");
        assert_eq!(entry.entry_type(), EntryType::Task);
    }

    #[test]
    fn command_entries_share_their_source() {
        let command = ContextEntry::command("cmd-1", "  cargo test --workspace ");
        assert_eq!(command.entry_type(), EntryType::Command);
        assert_eq!(command.summary(), "Ran `cargo test --workspace`");
        assert_eq!(command.content(), Some("  cargo test --workspace "));

        let result = ContextEntry::command_result("result-1", command.source(), "ok", "tests pass");
        assert_eq!(result.entry_type(), EntryType::CommandResult);
        assert_eq!(result.source(), command.source());
        assert_eq!(result.content(), Some("ok"));
    }

    #[test]
    fn entry_type_parses_loosely() {
        assert_eq!("command_result".parse::<EntryType>(), Ok(EntryType::CommandResult));
        assert_eq!("TASK-RESULT".parse::<EntryType>(), Ok(EntryType::TaskResult));
        assert!("folder".parse::<EntryType>().is_err());
    }

    #[test]
    fn unknown_entry_type_is_a_std_error() {
        let err = "folder".parse::<EntryType>().unwrap_err();
        assert_eq!(err, ParseEntryTypeError("folder".to_string()));
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(boxed.to_string(), "unknown entry type: folder");
    }

    #[test]
    fn entry_type_serializes_screaming_case() {
        let json = serde_json::to_string(&EntryType::ContextRequest).unwrap();
        assert_eq!(json, "\"CONTEXT_REQUEST\"");
    }

    #[test]
    fn truncate_summary_respects_char_boundaries() {
        assert_eq!(truncate_summary("héllo wörld", 20), "héllo wörld");
        assert_eq!(truncate_summary("ééééééééé", 6), "ééé...");
    }
}
