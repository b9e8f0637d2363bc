// Interactive command prompt on top of Client

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use indicatif::ProgressBar;
use crate::common::error::{Error, Result};
use super::progress;
use super::Client;

pub const PROMPT: &str = "ftp> ";

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Ls,
    Get(String),
    Put(String),
    Quit,
    Help,
    /// GET or PUT typed without a file name
    MissingFilename(String),
    Unknown(String),
}

/// Split a line into command and optional argument. Blank lines yield `None`.
pub fn parse_input(line: &str) -> Option<ShellCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    let command = command.to_ascii_uppercase();
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let parsed = match (command.as_str(), argument) {
        ("LS", _) => ShellCommand::Ls,
        ("QUIT" | "EXIT", _) => ShellCommand::Quit,
        ("HELP" | "?", _) => ShellCommand::Help,
        ("GET", Some(name)) => ShellCommand::Get(name),
        ("PUT", Some(path)) => ShellCommand::Put(path),
        ("GET" | "PUT", None) => ShellCommand::MissingFilename(command.clone()),
        _ => ShellCommand::Unknown(command.clone()),
    };
    Some(parsed)
}

/// Read-eval loop: prompt, parse, run against the server, print the outcome
pub struct Shell<R, W> {
    input: R,
    output: W,
    local_dir: PathBuf,
    show_progress: bool,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(input: R, output: W, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            input,
            output,
            local_dir: local_dir.into(),
            show_progress: true,
        }
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Run until QUIT or end of input. Server-side refusals are printed and
    /// the loop continues; a lost connection ends it with an error.
    pub fn run(&mut self, mut client: Client) -> Result<()> {
        writeln!(self.output, "{}", client.greeting())?;

        loop {
            write!(self.output, "{}", PROMPT)?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                if let Err(e) = client.quit() {
                    log::debug!("QUIT at end of input failed: {}", e);
                }
                return Ok(());
            }

            let command = match parse_input(&line) {
                Some(command) => command,
                None => continue,
            };

            let outcome = match command {
                ShellCommand::Ls => self.list(&mut client),
                ShellCommand::Get(name) => self.get(&mut client, &name),
                ShellCommand::Put(path) => self.put(&mut client, &path),
                ShellCommand::Quit => {
                    let farewell = client.quit()?;
                    writeln!(self.output, "{}", farewell)?;
                    return Ok(());
                }
                ShellCommand::Help => self.help(),
                ShellCommand::MissingFilename(command) => {
                    writeln!(self.output, "Usage: {} <filename>", command).map_err(Error::from)
                }
                ShellCommand::Unknown(command) => {
                    writeln!(self.output, "Unknown command: {} (type HELP for a list)", command)
                        .map_err(Error::from)
                }
            };

            if let Err(e) = outcome {
                if e.is_disconnect() || e.is_malformed() {
                    writeln!(self.output, "Connection lost: {}", e)?;
                    return Err(e);
                }
                writeln!(self.output, "Error: {}", e)?;
            }
        }
    }

    fn list(&mut self, client: &mut Client) -> Result<()> {
        let listing = client.list()?;
        if listing.files.is_empty() {
            writeln!(self.output, "No files on server")?;
        }
        for file in &listing.files {
            writeln!(self.output, "  {:<32} {:>12} bytes", file.name, file.size)?;
        }
        Ok(())
    }

    fn get(&mut self, client: &mut Client, name: &str) -> Result<()> {
        let bar = self.bar(name);
        match client.download_to(name, &self.local_dir, &bar) {
            Ok(path) => {
                progress::finish_success(&bar, name);
                writeln!(self.output, "Saved {}", path.display())?;
                Ok(())
            }
            Err(e) => {
                progress::finish_error(&bar, name);
                Err(e)
            }
        }
    }

    fn put(&mut self, client: &mut Client, arg: &str) -> Result<()> {
        let path = self.resolve_local(arg);
        if !path.is_file() {
            writeln!(self.output, "Local file not found: {}", path.display())?;
            return Ok(());
        }

        let bar = self.bar(arg);
        match client.upload_file(&path, &bar) {
            Ok(reply) => {
                progress::finish_success(&bar, arg);
                writeln!(self.output, "{}", reply)?;
                Ok(())
            }
            Err(e) => {
                progress::finish_error(&bar, arg);
                Err(e)
            }
        }
    }

    fn help(&mut self) -> Result<()> {
        writeln!(self.output, "Commands:")?;
        writeln!(self.output, "  LS               list files on the server")?;
        writeln!(self.output, "  GET <filename>   download into {}", self.local_dir.display())?;
        writeln!(self.output, "  PUT <path>       upload a local file")?;
        writeln!(self.output, "  QUIT             close the connection")?;
        Ok(())
    }

    /// Paths that do not exist as typed are looked up in the local directory
    fn resolve_local(&self, arg: &str) -> PathBuf {
        let path = Path::new(arg);
        if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.local_dir.join(path)
        }
    }

    fn bar(&self, label: &str) -> ProgressBar {
        if self.show_progress {
            progress::transfer_bar(label, 0)
        } else {
            ProgressBar::hidden()
        }
    }
}
