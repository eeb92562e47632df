use crate::ui::progress_message::{ProgressMessage, ProgressPhase};
use crate::ui::theme;
use crate::ui::Icons;
use indicatif::{HumanDuration, MultiProgress, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::thread;
use std::time::Duration;

/// Progress bars for an ingestion run, fed through a channel so that worker
/// threads never touch the terminal directly.
pub struct ProgressManager {
    mp: MultiProgress,
    ingesting: ProgressBar,
    committing: ProgressBar,
    handle: Option<thread::JoinHandle<()>>,
}

fn visible(bar: ProgressBar) -> ProgressBar {
    if console::Term::stdout().is_term() && !crate::output::is_quiet() {
        bar
    } else {
        ProgressBar::hidden()
    }
}

impl ProgressManager {
    pub fn new(total_streams: usize) -> (Self, crossbeam::channel::Sender<ProgressMessage>) {
        let (tx, rx) = crossbeam::channel::unbounded::<ProgressMessage>();
        let mp = MultiProgress::new();

        let ingesting = visible(mp.add(ProgressBar::new(total_streams as u64)));
        if let Ok(style) = ProgressStyle::with_template("{spinner} {bar:30} {pos}/{len} {msg}") {
            ingesting.set_style(style);
        }
        ingesting.set_message("Ingesting files");
        let committing = visible(mp.add(ProgressBar::new_spinner().with_message("Committing graph")));

        let ingesting_clone = ingesting.clone();
        let committing_clone = committing.clone();

        let handle = thread::spawn(move || {
            for msg in rx {
                match msg {
                    ProgressMessage::Started {
                        phase: ProgressPhase::Ingesting,
                        total,
                    } => {
                        ingesting_clone.set_length(total as u64);
                    }
                    ProgressMessage::Progress {
                        phase: ProgressPhase::Ingesting,
                        current,
                        file,
                    } => {
                        ingesting_clone.inc(current as u64);
                        if let Some(f) = file.filter(|f| !f.is_empty()) {
                            ingesting_clone.set_message(f);
                        }
                    }
                    ProgressMessage::Finished {
                        phase: ProgressPhase::Ingesting,
                    } => {
                        ingesting_clone.finish_with_message("Done");
                    }
                    ProgressMessage::Started {
                        phase: ProgressPhase::Committing,
                        ..
                    } => {
                        committing_clone.enable_steady_tick(Duration::from_millis(100));
                    }
                    ProgressMessage::Finished {
                        phase: ProgressPhase::Committing,
                    } => {
                        committing_clone.finish_with_message("Done");
                    }
                    _ => {}
                }
            }
        });

        (
            Self {
                mp,
                ingesting,
                committing,
                handle: Some(handle),
            },
            tx,
        )
    }

    /// Wait for the message thread to drain. All senders must be dropped
    /// first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }

    pub fn clear(&self) {
        self.ingesting.finish_and_clear();
        self.committing.finish_and_clear();
        self.mp.clear().ok();
    }

    pub fn finish_with_summary(&mut self, duration: Duration, files: usize, nodes: usize, edges: usize) {
        self.join();
        self.clear();
        println!();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("Complete in {}", HumanDuration(duration)).style(theme().success.clone())
        );
        println!(
            "  {} {}  {} {}  {} {}",
            Icons::FILE.style(theme().info.clone()),
            files,
            Icons::NODE.style(theme().info.clone()),
            nodes,
            Icons::LINK.style(theme().info.clone()),
            edges
        );
    }
}
