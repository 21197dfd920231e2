//! Line-oriented state machine over a `go build -x` trace.
//!
//! The machine has two states: outside any heredoc, and inside a staged
//! file. The only other state carried between lines is the map of shell
//! variables declared so far (`WORK=/tmp/go-build123`), which is applied to
//! every later line before it is classified.

use std::borrow::Cow;
use std::collections::HashMap;

use log::debug;
use regex_lite::{Captures, Regex};

use crate::manifest::PACKAGEFILE_DIRECTIVE;
use crate::TraceResult;

/// Line that closes a staged file.
pub const FILE_TERMINATOR: &str = "EOF";

/// What a trace yields: link command lines and staged file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTrace {
    /// Argument text of every linker call, in encounter order
    pub link_commands: Vec<String>,
    /// Staged file name -> content lines (variables already substituted)
    pub staged_files: HashMap<String, Vec<String>>,
}

impl ParsedTrace {
    /// Whether the trace contained no linker call at all
    pub fn is_empty(&self) -> bool {
        self.link_commands.is_empty()
    }

    /// Content of a staged file, if the trace wrote one with that name
    pub fn staged_file(&self, name: &str) -> Option<&[String]> {
        self.staged_files.get(name).map(Vec::as_slice)
    }

    /// Every `packagefile` line across all staged files
    pub fn packagefile_lines(&self) -> impl Iterator<Item = &str> {
        self.staged_files
            .values()
            .flatten()
            .map(String::as_str)
            .filter(|line| line.starts_with(PACKAGEFILE_DIRECTIVE))
    }
}

#[derive(Debug)]
enum State {
    Normal,
    InStagedFile(String),
}

/// Trace parser bound to one linker path.
///
/// Matchers are compiled once in [`TraceParser::new`]; [`TraceParser::parse`]
/// keeps all of its state on the stack, so one parser can be reused for
/// every build attempt.
#[derive(Debug)]
pub struct TraceParser {
    var_def: Regex,
    var_ref: Regex,
    start_file: Regex,
    link_command: Regex,
}

impl TraceParser {
    /// Build a parser that recognises calls to `linker_path`
    /// (normally `$GOTOOLDIR/link`).
    pub fn new(linker_path: &str) -> TraceResult<Self> {
        Ok(Self {
            var_def: Regex::new(r"^(\w+)=(\S*)$")?,
            var_ref: Regex::new(r"\$\w+")?,
            start_file: Regex::new(r"^cat > *(\S+) *<< 'EOF' *(?:#.*)?$")?,
            link_command: Regex::new(&format!(
                r"^.*{} (.*)$",
                regex_lite::escape(linker_path)
            ))?,
        })
    }

    /// Run the state machine over a whole trace.
    pub fn parse(&self, trace: &str) -> ParsedTrace {
        let mut parsed = ParsedTrace::default();
        let mut vars: HashMap<String, String> = HashMap::new();
        let mut state = State::Normal;

        for raw in trace.lines() {
            let line = self.substitute(raw, &vars);

            if let Some(caps) = self.start_file.captures(&line) {
                let name = caps[1].to_string();
                debug!("staged file start {:?} --- {}", name, line);
                parsed.staged_files.insert(name.clone(), Vec::new());
                state = State::InStagedFile(name);
                continue;
            }

            if let State::InStagedFile(name) = &state {
                if line == FILE_TERMINATOR {
                    debug!("staged file end {:?}", name);
                    state = State::Normal;
                } else {
                    debug!("staged file content {:?} --- {}", name, line);
                    parsed
                        .staged_files
                        .entry(name.clone())
                        .or_default()
                        .push(line.into_owned());
                }
                continue;
            }

            if let Some(caps) = self.var_def.captures(&line) {
                debug!("variable --- {}", line);
                vars.insert(caps[1].to_string(), caps[2].to_string());
            } else if let Some(caps) = self.link_command.captures(&line) {
                debug!("link command --- {}", line);
                parsed.link_commands.push(caps[1].to_string());
            } else {
                debug!("ignored --- {}", line);
            }
        }

        parsed
    }

    /// Replace `$NAME` references that are already declared; leave the rest.
    fn substitute<'a>(&self, line: &'a str, vars: &HashMap<String, String>) -> Cow<'a, str> {
        if vars.is_empty() {
            return Cow::Borrowed(line);
        }
        self.var_ref.replace_all(line, |caps: &Captures<'_>| {
            let reference = &caps[0];
            match vars.get(&reference[1..]) {
                Some(value) => value.clone(),
                None => reference.to_string(),
            }
        })
    }
}

/// Parse `trace` looking for calls to `linker_path`.
pub fn parse_trace(trace: &str, linker_path: &str) -> TraceResult<ParsedTrace> {
    Ok(TraceParser::new(linker_path)?.parse(trace))
}
