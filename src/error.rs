// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by the datastore, command table, and RESP codec.

use std::fmt;

/// Standard result type for fallible operations in this crate.
pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced by datastore operations, command parsing, and the wire codec.
///
/// Every variant's `Display` output matches one of the stable wire texts in
/// the command-reply contract; callers encode these directly as RESP error
/// replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// Wrong number of arguments for the named command.
    WrongArity { command: String },

    /// Malformed option combination (e.g. `SET k v EX` with no TTL value).
    SyntaxError,

    /// An argument expected to parse as an integer did not.
    NotAnInteger,

    /// Operation attempted against a key holding an incompatible value type.
    WrongType,

    /// A CMS operation was attempted against a key that does not exist.
    CmsKeyMissing,

    /// `CMS.INCRBY` pushed a counter past `u32::MAX`.
    CmsOverflow,

    /// `CMS.INITBYPROB` received an overestimation value outside `(0, 1)`.
    CmsInvalidOverestimation,

    /// `CMS.INITBYPROB` received a probability value outside `(0, 1)`.
    CmsInvalidProbability,

    /// `CMS.MERGE`-style operation between sketches of differing `(width, depth)`.
    CmsDimensionMismatch,

    /// The RESP decoder encountered bytes that do not form a valid frame.
    Protocol(String),

    /// The command name has no entry in the command table.
    UnknownCommand,
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongArity { command } => write!(
                f,
                "ERR wrong number of arguments for '{}' command",
                command.to_lowercase()
            ),
            Self::SyntaxError => write!(f, "ERR syntax error"),
            Self::NotAnInteger => write!(f, "ERR value is not an integer or out of range"),
            Self::WrongType => {
                write!(f, "WRONGTYPE Operation against a key holding the wrong kind of value")
            }
            Self::CmsKeyMissing => write!(f, "CMS: key does not exist"),
            Self::CmsOverflow => write!(f, "CMS: INCRBY overflow"),
            Self::CmsInvalidOverestimation => write!(f, "CMS: invalid overestimation value"),
            Self::CmsInvalidProbability => write!(f, "CMS: invalid prob value"),
            Self::CmsDimensionMismatch => write!(f, "CMS: dimensions do not match"),
            Self::Protocol(reason) => write!(f, "ERR Protocol error: {}", reason),
            Self::UnknownCommand => write!(f, "CMD NOT FOUND"),
        }
    }
}

impl std::error::Error for KvError {}
