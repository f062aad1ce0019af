//! requiscan: structured field extraction from scanned lab requisition PDFs
//! through hosted multimodal model APIs.

pub mod batch;
pub mod cli;
pub mod config;
pub mod output;
pub mod processor;
pub mod prompts;
pub mod report;
pub mod response;
pub mod schema;
