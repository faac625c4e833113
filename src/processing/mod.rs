//! Document processing pipeline: extraction, chunking, task tracking, and grounded chat.

pub mod chat;
pub mod chunking;
mod service;
pub mod tasks;
pub mod types;

pub use chunking::{Chunk, ChunkingParams, chunk_text};
pub use service::{PipelineComponents, PipelineService, PipelineSettings, ProcessingApi};
pub use tasks::{SweepReport, TaskRecord, TaskStatus, TaskStore, format_processing_time};
pub use types::{
    ChatRequest, ChatResponse, ChatSource, ChunkingError, DocumentUpload, FileEntry, FileListing,
    PdfInfo, PipelineError, SearchRequest, TableRunOutcome, UploadOutcome,
};
