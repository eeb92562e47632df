//! Per-worker ingestion client
//!
//! Drives the run state machine for one worker:
//!
//! ```text
//! NotStarted -> Started -> (FileOpen -> FileClosed)* -> Finished
//! ```
//!
//! Events that arrive in a state that does not accept them are dropped and
//! recorded as protocol violations. A fatal parser error retracts the open
//! file and drops the rest of its stream.

use crate::id::{ElementId, FileId};
use crate::ingest::engine::{Engine, GraphState};
use crate::ingest::event::ParseEvent;
use crate::location::{Diagnostic, DiagnosticKind};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    Started,
    FileOpen,
    FileClosed,
    Finished,
}

#[derive(Debug, Clone)]
struct OpenFile {
    id: FileId,
    path: String,
    /// Retracted after a fatal error or cancellation; events are dropped
    /// until the stream closes.
    failed: bool,
}

/// Counters for one client's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub events_applied: usize,
    pub events_dropped: usize,
}

impl ClientSummary {
    pub fn merge(&mut self, other: &ClientSummary) {
        self.files_indexed += other.files_indexed;
        self.files_failed += other.files_failed;
        self.events_applied += other.events_applied;
        self.events_dropped += other.events_dropped;
    }
}

pub struct IngestionClient {
    engine: Arc<Engine>,
    phase: Phase,
    current: Option<OpenFile>,
    summary: ClientSummary,
}

impl IngestionClient {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            phase: Phase::NotStarted,
            current: None,
            summary: ClientSummary::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn summary(&self) -> ClientSummary {
        self.summary
    }

    /// Path of the file currently open on this worker.
    pub fn current_file(&self) -> Option<&str> {
        self.current.as_ref().map(|f| f.path.as_str())
    }

    /// Apply one event.
    ///
    /// Returns the id of the element the event produced, if any. Protocol
    /// violations and dropped events are `Ok(None)`; errors are reserved for
    /// engine failures such as a poisoned lock.
    pub fn handle(&mut self, event: &ParseEvent) -> Result<Option<ElementId>> {
        if self.engine.is_cancelled() {
            self.abandon_current(DiagnosticKind::Cancelled, "ingestion cancelled")?;
            match event {
                ParseEvent::FinishParsingFile { .. } | ParseEvent::FinishParsing => {}
                ParseEvent::StartParsingFile { file } => {
                    let diagnostic = Diagnostic::new(DiagnosticKind::Cancelled, "skipped, ingestion cancelled")
                        .in_file(Some(file.path.as_str()));
                    self.engine.with_state(|s| s.diagnose(None, diagnostic))?;
                    return self.dropped();
                }
                _ => return self.dropped(),
            }
        }

        match event {
            ParseEvent::StartParsing => self.start_parsing(event),
            ParseEvent::FinishParsing => self.finish_parsing(event),
            ParseEvent::StartParsingFile { .. } => self.start_file(event),
            ParseEvent::FinishParsingFile { path } => self.finish_file(event, path),
            ParseEvent::Error { .. } if matches!(self.phase, Phase::NotStarted | Phase::Finished) => {
                self.violation(event, "run not started")
            }
            ParseEvent::Error { location, message, fatal } => {
                let diagnostic = Diagnostic::new(DiagnosticKind::Parser, message.clone())
                    .at(location.as_ref())
                    .fatal(*fatal);
                self.report(diagnostic)?;
                if *fatal {
                    self.abandon_current(DiagnosticKind::Parser, "fatal error")?;
                }
                Ok(None)
            }
            _ => self.apply(event),
        }
    }

    /// Feed a sequence of events, stopping at the first engine failure.
    pub fn handle_all<'a>(&mut self, events: impl IntoIterator<Item = &'a ParseEvent>) -> Result<()> {
        for event in events {
            self.handle(event)?;
        }
        Ok(())
    }

    fn start_parsing(&mut self, event: &ParseEvent) -> Result<Option<ElementId>> {
        if self.phase != Phase::NotStarted {
            return self.violation(event, "run already started");
        }
        tracing::debug!("Worker started parsing");
        self.phase = Phase::Started;
        Ok(None)
    }

    fn finish_parsing(&mut self, event: &ParseEvent) -> Result<Option<ElementId>> {
        match self.phase {
            Phase::NotStarted | Phase::Finished => return self.violation(event, "run not started"),
            Phase::FileOpen => {
                let path = self.current_file().unwrap_or_default().to_string();
                self.violation(event, &format!("{} was never finished", path))?;
                self.abandon_current(DiagnosticKind::ProtocolViolation, "unfinished at end of run")?;
                self.current = None;
            }
            Phase::Started | Phase::FileClosed => {}
        }
        tracing::debug!(
            "Worker finished parsing: {} indexed, {} failed",
            self.summary.files_indexed,
            self.summary.files_failed
        );
        self.phase = Phase::Finished;
        Ok(None)
    }

    fn start_file(&mut self, event: &ParseEvent) -> Result<Option<ElementId>> {
        let ParseEvent::StartParsingFile { file } = event else {
            return Ok(None);
        };
        match self.phase {
            Phase::Started | Phase::FileClosed => {}
            Phase::FileOpen => return self.violation(event, "a file is already open on this worker"),
            Phase::NotStarted | Phase::Finished => return self.violation(event, "run not started"),
        }

        match self.engine.with_state(|s| s.begin_file(file))? {
            Ok(id) => {
                tracing::info!("Ingesting {}", file.path);
                self.current = Some(OpenFile {
                    id,
                    path: file.path.clone(),
                    failed: false,
                });
                self.phase = Phase::FileOpen;
                Ok(Some(ElementId::File(id)))
            }
            Err(err) => self.violation(event, &err.to_string()),
        }
    }

    fn finish_file(&mut self, event: &ParseEvent, path: &str) -> Result<Option<ElementId>> {
        let Some(current) = self.current.clone() else {
            return self.violation(event, "no file is open");
        };
        if current.path != path {
            return self.violation(event, &format!("{} is open, not {}", current.path, path));
        }

        if !current.failed {
            self.engine.with_state(|s| s.end_file(current.id))??;
            self.summary.files_indexed += 1;
            tracing::debug!("Finished {}", path);
        }
        self.current = None;
        self.phase = Phase::FileClosed;
        Ok(None)
    }

    /// Apply a symbol, relationship, file, macro or comment event to the
    /// open file.
    fn apply(&mut self, event: &ParseEvent) -> Result<Option<ElementId>> {
        let Some(current) = self.current.as_ref() else {
            return self.violation(event, "no file is open");
        };
        if current.failed {
            return self.dropped();
        }
        let file = current.id;

        let applied = self.engine.with_state(|s| apply_event(s, file, event))??;
        match applied {
            Applied::Element(id) => {
                self.summary.events_applied += 1;
                Ok(id)
            }
            Applied::Rejected(reason) => self.violation(event, &reason),
        }
    }

    /// Retract the open file and drop the rest of its stream.
    fn abandon_current(&mut self, kind: DiagnosticKind, reason: &str) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        if current.failed {
            return Ok(());
        }
        current.failed = true;
        let (id, path) = (current.id, current.path.clone());
        self.summary.files_failed += 1;
        tracing::warn!("Abandoning {}: {}", path, reason);

        let note = (kind == DiagnosticKind::Cancelled)
            .then(|| Diagnostic::new(kind, format!("{}, partial results discarded", reason)).in_file(Some(path.as_str())));
        self.engine.with_state(|s| {
            if let Some(note) = note {
                s.diagnose(None, note);
            }
            s.retract(id);
        })?;
        Ok(())
    }

    fn report(&mut self, diagnostic: Diagnostic) -> Result<()> {
        let file = self.current.as_ref().map(|f| f.id);
        let path = self.current.as_ref().map(|f| f.path.clone());
        self.engine
            .with_state(|s| s.diagnose(file, diagnostic.in_file(path.as_deref())))
    }

    fn violation(&mut self, event: &ParseEvent, reason: &str) -> Result<Option<ElementId>> {
        let diagnostic = Diagnostic::new(
            DiagnosticKind::ProtocolViolation,
            format!("{} dropped: {}", event.name(), reason),
        )
        .at(event.location());
        self.report(diagnostic)?;
        self.dropped()
    }

    fn dropped(&mut self) -> Result<Option<ElementId>> {
        self.summary.events_dropped += 1;
        Ok(None)
    }
}

impl Drop for IngestionClient {
    fn drop(&mut self) {
        // a worker that goes away mid-file must not leave a partial contribution
        if self.current.as_ref().is_some_and(|f| !f.failed) {
            if let Err(err) = self.abandon_current(DiagnosticKind::ProtocolViolation, "worker stopped") {
                tracing::error!("Failed to retract unfinished file: {}", err);
            }
        }
    }
}

enum Applied {
    Element(Option<ElementId>),
    Rejected(String),
}

/// Apply one in-file event under the engine lock.
fn apply_event(state: &mut GraphState, file: FileId, event: &ParseEvent) -> Result<Applied> {
    if let Some((kind, decl)) = event.declaration() {
        let id = state.declare(file, kind, decl);
        return Ok(Applied::Element(Some(id.into())));
    }

    if let Some((kind, rel)) = event.relationship() {
        for endpoint in [&rel.source, &rel.target] {
            if !state.can_resolve(endpoint) {
                return Ok(Applied::Rejected(format!("unknown endpoint {}", endpoint)));
            }
        }
        let id = state.relate(file, kind, rel)?;
        return Ok(Applied::Element(Some(id.into())));
    }

    let element = match event {
        ParseEvent::FileParsed { file: info } => Some(state.file_parsed(file, info).into()),
        ParseEvent::FileInclude {
            location,
            file: from,
            included,
        } => Some(state.include(file, location, from, included)?.into()),
        ParseEvent::MacroDefine {
            location,
            name,
            scope_location,
        } => Some(state.define_macro(file, name, location, scope_location.as_ref()).into()),
        ParseEvent::MacroExpand { location, name } => Some(state.expand_macro(file, name, location)?.into()),
        ParseEvent::Comment { location } => state.comment(file, location).map(ElementId::from),
        other => return Ok(Applied::Rejected(format!("unexpected {} inside a file", other.name()))),
    };
    Ok(Applied::Element(element))
}
