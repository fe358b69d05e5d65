// SPDX-License-Identifier: MIT

//! Command-line parsing for the `vmchecker-queue-managerd` binary.
//!
//! Supports `-0 FILE` / `-1 FILE` / `-2 FILE` stdio redirection and the
//! required `-c COURSE_ID` course selector. Parsed by hand rather than via a
//! derive-based argument parser, matching the flag set's fixed, small shape.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub course_id: String,
    pub stdin_file: Option<PathBuf>,
    pub stdout_file: Option<PathBuf>,
    pub stderr_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// `-c` was never supplied. The exact printed message is
    /// `course_id parameter required`.
    MissingCourseId,
    MissingValue { flag: &'static str },
    UnknownFlag { flag: String },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::MissingCourseId => write!(f, "course_id parameter required"),
            CliError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            CliError::UnknownFlag { flag } => write!(f, "unrecognized option '{flag}'"),
        }
    }
}

impl CliArgs {
    /// Parse an argument list (excluding `argv[0]`).
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, CliError> {
        let mut course_id = None;
        let mut stdin_file = None;
        let mut stdout_file = None;
        let mut stderr_file = None;

        let mut it = args.into_iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-0" => stdin_file = Some(PathBuf::from(next_value(&mut it, "-0")?)),
                "-1" => stdout_file = Some(PathBuf::from(next_value(&mut it, "-1")?)),
                "-2" => stderr_file = Some(PathBuf::from(next_value(&mut it, "-2")?)),
                "-c" => course_id = Some(next_value(&mut it, "-c")?),
                other => return Err(CliError::UnknownFlag { flag: other.to_string() }),
            }
        }

        Ok(Self {
            course_id: course_id.ok_or(CliError::MissingCourseId)?,
            stdin_file,
            stdout_file,
            stderr_file,
        })
    }
}

fn next_value<I: Iterator<Item = String>>(it: &mut I, flag: &'static str) -> Result<String, CliError> {
    it.next().ok_or(CliError::MissingValue { flag })
}
