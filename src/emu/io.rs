//! Line-oriented input for the console and for the program's IN instruction.

use std::{
    collections::VecDeque,
    io::{self, BufRead},
};

use rustyline::{error::ReadlineError, DefaultEditor};

/// Something that hands out whole lines of text. `Ok(None)` means end of input.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Lines from any buffered reader, e.g. a locked stdin or a file.
pub struct Lines<R> {
    reader: R,
}

impl<R: BufRead> Lines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for Lines<R> {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// Lines from the process's standard input, locking it only for the duration of each read.
#[derive(Default)]
pub struct StdinLines;

impl LineSource for StdinLines {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        Lines::new(io::stdin().lock()).read_line(prompt)
    }
}

/// An interactive line editor with history, for when stdin is a terminal.
pub struct Readline {
    editor: DefaultEditor,
}

impl Readline {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for Readline {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        log::debug!("could not record history entry: {}", e);
                    }
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
        }
    }
}

/// A fixed list of lines, handed out in order.
#[derive(Debug, Clone, Default)]
pub struct Script {
    lines: VecDeque<String>,
}

impl Script {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for Script {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Feeds the IN instruction one character at a time from a line source.
///
/// Each line is followed by a single `'\n'`. An empty line yields just the `'\n'`.
pub struct TermBuffer {
    source: Box<dyn LineSource>,
    line: VecDeque<u8>,
    pending_newline: bool,
}

impl TermBuffer {
    pub fn new(source: Box<dyn LineSource>) -> Self {
        Self {
            source,
            line: VecDeque::new(),
            pending_newline: false,
        }
    }

    /// Returns the next input byte, or `None` once the source is exhausted.
    pub fn next_char(&mut self) -> io::Result<Option<u8>> {
        if let Some(c) = self.line.pop_front() {
            return Ok(Some(c));
        }
        if self.pending_newline {
            self.pending_newline = false;
            return Ok(Some(b'\n'));
        }
        match self.source.read_line("")? {
            Some(line) => {
                self.line.extend(line.bytes());
                self.pending_newline = true;
                self.next_char()
            }
            None => Ok(None),
        }
    }
}
