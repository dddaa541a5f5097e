//! Crate-wide error taxonomy

use thiserror::Error;

/// Errors raised by registries, loaders and their supporting types.
///
/// The first group of variants is the closed taxonomy shared by every
/// registry operation; the remaining variants cover configuration,
/// filesystem and loader faults.
#[derive(Error, Debug)]
pub enum Error {
    #[error("the key '{0}' is not unique")]
    NotUnique(String),

    #[error("the method '{method}' of '{type_name}' is not implemented")]
    MethodNotImplemented {
        type_name: &'static str,
        method: &'static str,
    },

    #[error("the value '{value}' is not of the desired type: expected {expected}")]
    WrongType {
        value: String,
        expected: &'static str,
    },

    #[error("the value '{value}' is not an instance of {class}")]
    NotAnInstance {
        value: String,
        class: &'static str,
    },

    #[error("the module '{0}' does not have a source path")]
    ModuleHasNoSource(String),

    #[error("the module '{0}' was not found")]
    ModuleNotFound(String),

    #[error("the emitter '{0}' was not found")]
    EmitterNotFound(String),

    #[error("the listener kind '{0}' is invalid")]
    InvalidListenerKind(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("loader error: {0}")]
    Loader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
