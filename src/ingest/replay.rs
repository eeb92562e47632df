//! Parallel replay of recorded event logs
//!
//! A log lists each file's stream contiguously. [`split_streams`] cuts it
//! into per-file streams and [`replay`] hands those to a pool of workers,
//! each with its own [`IngestionClient`], all writing into one [`Engine`].

use crate::ingest::client::{ClientSummary, IngestionClient};
use crate::ingest::engine::Engine;
use crate::ingest::event::ParseEvent;
use crate::ui::progress_message::{ProgressMessage, ProgressPhase};
use crate::{Error, Result};
use crossbeam::channel::{self, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One file's events, from `start_parsing_file` to `finish_parsing_file`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStream {
    /// Empty for events found outside any file
    pub path: String,
    pub events: Vec<ParseEvent>,
}

/// Cut a log into per-file streams.
///
/// Run boundaries are dropped, every worker issues its own. Events outside
/// any file are kept in a stream with an empty path so that replaying them
/// reports the same protocol violations the live run would have.
pub fn split_streams(events: Vec<ParseEvent>) -> Vec<FileStream> {
    let mut streams = Vec::new();
    let mut stray = Vec::new();
    let mut current: Option<FileStream> = None;

    for event in events {
        match event {
            ParseEvent::StartParsing | ParseEvent::FinishParsing => {}
            ParseEvent::StartParsingFile { ref file } => {
                if let Some(open) = current.take() {
                    streams.push(open);
                }
                current = Some(FileStream {
                    path: file.path.clone(),
                    events: vec![event],
                });
            }
            ParseEvent::FinishParsingFile { .. } => match current.take() {
                Some(mut open) => {
                    open.events.push(event);
                    streams.push(open);
                }
                None => stray.push(event),
            },
            _ => match current.as_mut() {
                Some(open) => open.events.push(event),
                None => stray.push(event),
            },
        }
    }

    if let Some(open) = current {
        streams.push(open);
    }
    if !stray.is_empty() {
        streams.push(FileStream {
            path: String::new(),
            events: stray,
        });
    }
    streams
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub workers: usize,
    pub progress: Option<Sender<ProgressMessage>>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            progress: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub streams: usize,
    pub workers: usize,
    #[serde(flatten)]
    pub summary: ClientSummary,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Replay per-file streams across a pool of worker threads.
pub fn replay(engine: &Arc<Engine>, streams: Vec<FileStream>, options: &ReplayOptions) -> Result<ReplayReport> {
    let start = Instant::now();
    let total = streams.len();
    let workers = options.workers.clamp(1, total.max(1));
    tracing::info!("Replaying {} file stream(s) on {} worker(s)", total, workers);

    let progress = options.progress.clone();
    if let Some(tx) = &progress {
        let _ = tx.send(ProgressMessage::Started {
            phase: ProgressPhase::Ingesting,
            total,
        });
    }

    let (tx, rx) = channel::unbounded::<FileStream>();
    for stream in streams {
        // receiver is alive until the scope below ends
        let _ = tx.send(stream);
    }
    drop(tx);

    let results: Vec<Result<ClientSummary>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let rx = rx.clone();
                let progress = progress.clone();
                let engine = Arc::clone(engine);
                scope.spawn(move || -> Result<ClientSummary> {
                    let mut client = IngestionClient::new(engine);
                    client.handle(&ParseEvent::StartParsing)?;
                    for stream in rx {
                        client.handle_all(&stream.events)?;
                        if let Some(tx) = &progress {
                            let _ = tx.send(ProgressMessage::Progress {
                                phase: ProgressPhase::Ingesting,
                                current: 1,
                                file: Some(stream.path.clone()),
                            });
                        }
                    }
                    client.handle(&ParseEvent::FinishParsing)?;
                    Ok(client.summary())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(Error::Worker("ingestion worker panicked".to_string())))
            })
            .collect()
    });

    let mut summary = ClientSummary::default();
    for result in results {
        summary.merge(&result?);
    }

    if let Some(tx) = &progress {
        let _ = tx.send(ProgressMessage::Finished {
            phase: ProgressPhase::Ingesting,
        });
    }

    let report = ReplayReport {
        streams: total,
        workers,
        summary,
        elapsed: start.elapsed(),
    };
    tracing::info!(
        "Replay finished: {} indexed, {} failed, {} event(s) dropped",
        report.summary.files_indexed,
        report.summary.files_failed,
        report.summary.events_dropped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{DiagnosticKind, FileInfo, ParseLocation};
    use crate::ingest::event::Declaration;
    use crate::name::QualifiedName;

    fn file_declaring(path: &str, names: &[&str]) -> Vec<ParseEvent> {
        let mut events = vec![ParseEvent::StartParsingFile { file: FileInfo::new(path) }];
        for (i, name) in names.iter().enumerate() {
            events.push(ParseEvent::Function(Declaration::new(
                QualifiedName::from_path(name),
                ParseLocation::new(path, i as u32 + 1, 1, i as u32 + 1, 10),
            )));
        }
        events.push(ParseEvent::FinishParsingFile { path: path.to_string() });
        events
    }

    #[test]
    fn test_split_streams() {
        let mut log = vec![ParseEvent::StartParsing];
        log.extend(file_declaring("c.cpp", &["util::log"]));
        log.push(ParseEvent::Comment {
            location: ParseLocation::new("x.cpp", 1, 1, 1, 2),
        });
        log.extend(file_declaring("d.cpp", &["util::log", "main"]));
        log.push(ParseEvent::FinishParsing);

        let streams = split_streams(log);
        let paths: Vec<&str> = streams.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["c.cpp", "d.cpp", ""]);
        assert_eq!(streams[0].events.len(), 3);
        assert_eq!(streams[1].events.len(), 4);
        assert_eq!(streams[2].events.len(), 1);
    }

    #[test]
    fn test_concurrent_shared_declaration() {
        let engine = Arc::new(Engine::new());
        let mut log = file_declaring("c.cpp", &["util::log", "c_only"]);
        log.extend(file_declaring("d.cpp", &["util::log", "d_only"]));

        let options = ReplayOptions {
            workers: 2,
            progress: None,
        };
        let report = replay(&engine, split_streams(log), &options).unwrap();
        assert_eq!(report.summary.files_indexed, 2);
        assert_eq!(report.workers, 2);

        let log_node = engine
            .find_node(&QualifiedName::from_path("util::log"))
            .unwrap()
            .unwrap();
        let mut contributors = engine.node_contributors(log_node.id).unwrap();
        contributors.sort();
        assert_eq!(contributors, vec!["c.cpp", "d.cpp"]);

        engine.retract_file("c.cpp").unwrap();
        assert!(engine.node(log_node.id).unwrap().is_some());
        engine.retract_file("d.cpp").unwrap();
        assert!(engine.node(log_node.id).unwrap().is_none());
        assert!(engine.check_invariants().unwrap());
    }

    #[test]
    fn test_stray_events_become_violations() {
        let engine = Arc::new(Engine::new());
        let log = vec![ParseEvent::Comment {
            location: ParseLocation::new("x.cpp", 1, 1, 1, 2),
        }];
        let report = replay(&engine, split_streams(log), &ReplayOptions::default()).unwrap();
        assert_eq!(report.summary.events_dropped, 1);
        let kinds: Vec<DiagnosticKind> = engine.diagnostics().unwrap().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::ProtocolViolation]);
    }

    #[test]
    fn test_progress_messages() {
        let engine = Arc::new(Engine::new());
        let (tx, rx) = channel::unbounded();
        let options = ReplayOptions {
            workers: 4,
            progress: Some(tx),
        };
        replay(&engine, split_streams(file_declaring("a.cpp", &["f"])), &options).unwrap();
        drop(options);

        let messages: Vec<ProgressMessage> = rx.iter().collect();
        assert!(matches!(messages.first(), Some(ProgressMessage::Started { total: 1, .. })));
        assert!(matches!(messages.last(), Some(ProgressMessage::Finished { .. })));
        assert_eq!(messages.len(), 3);
    }
}
