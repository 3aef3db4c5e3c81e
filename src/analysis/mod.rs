// Analysis - background rhythm extraction, matching and stage tracing

pub mod trace;
pub mod worker;

pub use trace::{read_trace_file, AnalysisStage, TraceEntry, TraceError, TraceWriter};
pub use worker::{AnalysisError, AnalysisReport, AnalysisRequest, AnalysisSettings, AnalysisWorker};
