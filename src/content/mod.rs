//! Content intake and post generation
//!
//! `extractor` turns source material (web pages, PDFs, raw text) into
//! normalized [`ExtractedContent`]; `generator` turns that content into
//! post drafts through a chat-completion model. Both sit behind traits
//! so the automation manager and the CLI can be tested against stubs.

pub mod extractor;
pub mod generator;

pub use extractor::{
    ContentExtractor, ExtractError, ExtractResult, ExtractedContent, HttpExtractor, SourceInput,
};
pub use generator::{
    ChatCompletionGenerator, GenerateError, GenerateResult, GeneratedPost, PostGenerator,
    StyleParams,
};
