use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use fhir_form::{FieldKey, FormSession, RenderField, RenderPayload};

use crate::CliError;

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: prompts only.
    Clean,
    /// Verbose output: status line and choice lists.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Walks the answerable fields of a session one prompt at a time.
///
/// Fields become answerable as earlier answers enable them, so the next
/// prompt is picked from a fresh render after every accepted answer.
pub struct Wizard<R, W> {
    input: R,
    output: W,
    verbosity: Verbosity,
    asked: BTreeSet<FieldKey>,
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    pub fn new(input: R, output: W, verbosity: Verbosity) -> Self {
        Self {
            input,
            output,
            verbosity,
            asked: BTreeSet::new(),
        }
    }

    pub fn run(&mut self, session: &mut FormSession) -> Result<(), CliError> {
        let payload = session.render();
        writeln!(self.output, "Form: {}", payload.form_title)?;

        loop {
            let payload = session.render();
            if self.verbosity.is_verbose() {
                writeln!(
                    self.output,
                    "Status: {} ({}/{})",
                    payload.status.as_str(),
                    payload.progress.answered,
                    payload.progress.total
                )?;
            }
            let Some(field) = self.next_field(&payload) else {
                break;
            };
            let field = field.clone();
            let position = self.asked.len() + 1;
            self.ask(session, &field, position, payload.progress.total)?;
            self.asked.insert(field.key);
        }
        Ok(())
    }

    fn next_field<'p>(&self, payload: &'p RenderPayload) -> Option<&'p RenderField> {
        payload.fields.iter().find(|field| {
            field.visible
                && !field.disabled
                && !field.read_only
                && field.kind != "display"
                && !self.asked.contains(&field.key)
        })
    }

    fn ask(
        &mut self,
        session: &mut FormSession,
        field: &RenderField,
        position: usize,
        total: usize,
    ) -> Result<(), CliError> {
        loop {
            self.show_prompt(field, position, total)?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(CliError::Aborted);
            }
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("exit") {
                return Err(CliError::Aborted);
            }
            if trimmed.is_empty() {
                return Ok(());
            }

            let values = parse_answer(field, trimmed);
            session.update(&field.key, values)?;
            let rejected = session
                .validate()
                .errors
                .into_iter()
                .find(|error| error.field_key.as_deref() == Some(field.key.to_string().as_str()));
            match rejected {
                None => return Ok(()),
                Some(error) => {
                    writeln!(self.output, "Invalid answer: {}", error.message)?;
                    session.update(&field.key, field.values.clone())?;
                }
            }
        }
    }

    fn show_prompt(
        &mut self,
        field: &RenderField,
        position: usize,
        total: usize,
    ) -> Result<(), CliError> {
        let mut line = format!("{}/{} {}", position, total, field.label);
        if field.required {
            line.push_str(" *");
        }
        line.push_str(&format!(" ({})", field.kind));
        let current: Vec<&str> = field
            .values
            .iter()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();
        if !current.is_empty() {
            line.push_str(&format!(" [{}]", current.join(", ")));
        }
        writeln!(self.output, "{}", line)?;
        if self.verbosity.is_verbose()
            && let Some(choices) = &field.choices
        {
            writeln!(self.output, "Choices: {}", choices.join(", "))?;
        }
        if field.repeat {
            writeln!(self.output, "Separate several answers with ';'.")?;
        }
        write!(self.output, "> ")?;
        self.output.flush()?;
        Ok(())
    }
}

fn parse_answer(field: &RenderField, raw: &str) -> Vec<String> {
    if field.repeat {
        raw.split(';')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        vec![raw.to_string()]
    }
}
