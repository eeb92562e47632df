//! Ingestion Client - folds parse events into the shared graph

pub mod client;
pub mod engine;
pub mod event;
pub mod replay;

pub use client::{ClientSummary, IngestionClient, Phase};
pub use engine::{Engine, GraphSnapshot, GraphState};
pub use event::{read_events, write_events, Declaration, ParseEvent, Relationship, SymbolRef};
pub use replay::{replay, split_streams, FileStream, ReplayOptions, ReplayReport};
