//! Fuzz target for line tokenizing and command parsing
//!
//! # Strategy
//!
//! - Raw lines: arbitrary UTF-8, including control characters and huge tokens
//! - Known verbs: a valid verb token followed by arbitrary arguments
//!
//! # Invariants
//!
//! - Tokenizing and parsing NEVER panic
//! - A parsed command reports the verb it was parsed from
//! - Parsed arguments contain no whitespace except inside message bodies
//! - Usage errors name the verb that was misused

#![no_main]

use arbitrary::Arbitrary;
use huddle_proto::{Command, Verb, tokenize};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum LineInput {
    Raw(String),
    KnownVerb { verb_idx: u8, args: Vec<String> },
}

fuzz_target!(|input: LineInput| {
    let line = match input {
        LineInput::Raw(line) => line,
        LineInput::KnownVerb { verb_idx, args } => {
            let verb = Verb::ALL[verb_idx as usize % Verb::ALL.len()];
            let mut line = verb.token().to_string();
            for arg in args {
                line.push(' ');
                line.push_str(&arg);
            }
            line
        },
    };

    let Some((token, args)) = tokenize(&line) else {
        assert!(line.trim().is_empty());
        return;
    };

    let Ok(verb) = token.parse::<Verb>() else {
        return;
    };
    assert_eq!(verb.token(), token);

    match Command::parse(verb, &args) {
        Ok(command) => {
            assert_eq!(command.verb(), verb);
            match &command {
                Command::Register { username, password }
                | Command::Login { username, password } => {
                    assert!(!username.is_empty() && !password.is_empty());
                    assert!(!username.contains(char::is_whitespace));
                },
                Command::PrivateMessage { recipient, body } => {
                    assert!(!recipient.contains(char::is_whitespace));
                    assert!(!body.is_empty());
                },
                Command::GroupMessage { group, body } => {
                    assert!(!group.contains(char::is_whitespace));
                    assert!(!body.is_empty());
                },
                _ => {},
            }
        },
        Err(usage) => assert_eq!(usage.verb, verb),
    }
});
