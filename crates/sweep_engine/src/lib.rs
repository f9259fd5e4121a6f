//! Scrollsweep engine: convergence-based extraction and effect execution.
mod convergence;
mod cues;
mod engine;
mod export;
mod extract;
mod filename;
mod frames;
mod index;
mod persist;
mod rows;
mod surface;
mod sweep;
mod threads;
mod types;

pub use convergence::ConvergenceState;
pub use cues::{
    merge_ticks, mutation_ticks, poll_ticks, watch, ChangeTicks, Cue, CueError, CuePlayer,
    CueQueue, DebounceGate, Transition, TransitionDetector,
};
pub use engine::{ChannelProgressSink, DeliveryError, EngineHandle, ProgressSink, SweepTarget};
pub use export::{write_export, ExportError, ExportFormat, ExportSummary, Table};
pub use extract::{
    AuditRowExtractor, ChatMessageExtractor, Extracted, HtmlNode, NavLinkExtractor,
    RecordExtractor,
};
pub use filename::export_filename;
pub use frames::{read_frames, HtmlFrameSurface};
pub use index::{collect_visible, RecordIndex};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use rows::{
    ticket_rows_from_document, RowFilter, RowStats, RowVisibility, TicketRow, ARCHIVED_MARKER,
    NO_SUBJECT_MARKER,
};
pub use surface::{AffordanceId, Measurement, Surface, SurfaceError};
pub use sweep::{
    ContainerWait, MissingContainer, ResetMode, SweepContext, SweepPlan, SweepSettings, Sweeper,
};
pub use threads::{
    build_threads, flatten_threads, reconcile_senders, Answer, ChatMessage, MessageKind,
    QuestionThread, Reply, ThreadRow, ThreadStats, THREAD_HEADERS,
};
pub use types::{EngineEvent, FailureKind, JobProgress, SweepError, SweepReport, Termination};
