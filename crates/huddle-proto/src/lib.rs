//! Huddle line protocol.
//!
//! Newline-terminated UTF-8 text in both directions. A client line is a
//! command of the form `/<verb> [arg]*`; the server answers with one or more
//! lines, each terminated by `\n`. There is no binary framing and no length
//! prefix.
//!
//! # Components
//!
//! - [`Verb`] and [`Command`]: tokenizing and typed parsing of client lines
//! - [`reply`]: canned response texts sent to the issuing connection
//! - [`format`]: lines fanned out to other connections and the message bus

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod command;
pub mod format;
pub mod reply;

pub use command::{Command, UsageError, Verb, tokenize};
