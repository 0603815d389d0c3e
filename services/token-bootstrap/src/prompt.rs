//! Operator prompts
//!
//! Questions go to stderr; stdout is reserved for the token JSON. Ctrl+C is
//! handled once for the whole run in `main`, not per prompt.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::error::{Error, Result};

pub struct Prompter<R> {
    lines: Lines<R>,
}

impl Prompter<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Prompter<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Print `question` and wait for one trimmed line.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{question}")?;
        stderr.flush()?;

        match self.lines.next_line().await? {
            Some(line) => Ok(line.trim().to_owned()),
            None => Err(Error::InputClosed),
        }
    }

    /// Ask until `accept` takes the answer. Rejections are shown and re-asked.
    pub async fn ask_until<T, E, F>(&mut self, question: &str, mut accept: F) -> Result<T>
    where
        F: FnMut(&str) -> std::result::Result<T, E>,
        E: std::fmt::Display,
    {
        loop {
            let answer = self.ask(question).await?;
            match accept(&answer) {
                Ok(value) => return Ok(value),
                Err(e) => eprintln!("{e}"),
            }
        }
    }
}
