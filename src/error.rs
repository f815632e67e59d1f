use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MasstError {
    #[error("invalid USI: {0}")]
    InvalidUsi(String),

    #[error("invalid search database: {0}")]
    InvalidDatabase(String),

    #[error("unknown ontology: {0}")]
    UnknownOntology(String),

    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid ontology file {path}: {message}")]
    InvalidOntology { path: String, message: String },

    #[error("metadata table {path} is missing required column {column}")]
    MissingColumn { path: String, column: String },

    #[error("failed to read table {path}: {message}")]
    TableRead { path: String, message: String },

    #[error("failed to write table {path}: {message}")]
    TableWrite { path: String, message: String },

    #[error("fastMASST request failed: {0}")]
    SearchHttp(String),

    #[error("fastMASST returned status {status}: {message}")]
    SearchStatus { status: u16, message: String },

    #[error("fastMASST returned malformed response: {0}")]
    SearchResponse(String),

    #[error("failed to serialize JSON: {0}")]
    Serialize(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
