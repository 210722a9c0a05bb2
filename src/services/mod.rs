pub mod document;
pub mod extractor;
pub mod llm_service;
pub mod pdf_render;
pub mod prompts;
pub mod response_parser;

pub use extractor::{ContentExtractor, TesseractExtractor};
pub use llm_service::{Attachment, ChatBackend, ChatRequest, LlmService};
pub use pdf_render::PdfRenderer;
pub use response_parser::{recover, recover_questions, Recovered, RecoveryStage};
