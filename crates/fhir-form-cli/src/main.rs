mod wizard;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use fhir_form::{
    FieldKey, FormError, FormOptions, FormSession, KeyParseError, Questionnaire,
    QuestionnaireResponse, SubmitHooks, SubmitOutcome, ValidationResult, render_json_ui,
    render_text,
};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use wizard::{Verbosity, Wizard};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no --questionnaire given and the response contains none")]
    NoQuestionnaire,
    #[error(transparent)]
    Key(#[from] KeyParseError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("validation failed")]
    Invalid,
    #[error("aborted by user")]
    Aborted,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "FHIR Questionnaire form CLI",
    long_about = "Builds forms from FHIR Questionnaires, inspects their state, and writes edits back into QuestionnaireResponses"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaKind {
    Options,
    Edits,
    Questionnaire,
    Response,
}

/// Inputs shared by every command that opens a form.
#[derive(clap::Args)]
struct FormArgs {
    /// QuestionnaireResponse JSON holding the initial answers.
    #[arg(long, value_name = "RESPONSE")]
    response: PathBuf,
    /// Questionnaire JSON; defaults to the one contained in the response.
    #[arg(long, value_name = "QUESTIONNAIRE")]
    questionnaire: Option<PathBuf>,
    /// JSON file with form options (read_only, submit_label, reset_label).
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Render the form fields with their current values.
    Fields {
        #[command(flatten)]
        form: FormArgs,
        /// Output format.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Print the hydrated form state as JSON.
    State {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Apply edits, validate, and write the updated response.
    Submit {
        #[command(flatten)]
        form: FormArgs,
        /// JSON file with `values`, `add_instances` and `remove_instances`.
        #[arg(long, value_name = "EDITS")]
        edits: Option<PathBuf>,
        /// Where to write the response; stdout when omitted.
        #[arg(long, value_name = "OUT")]
        out: Option<PathBuf>,
    },
    /// Answer the form interactively, then write the updated response.
    Fill {
        #[command(flatten)]
        form: FormArgs,
        /// Where to write the response; stdout when omitted.
        #[arg(long, value_name = "OUT")]
        out: Option<PathBuf>,
    },
    /// Print a JSON schema for one of the input documents.
    Schema {
        #[arg(value_enum, default_value_t = SchemaKind::Options)]
        kind: SchemaKind,
    },
}

/// Edits applied by `submit`, in order: instances are added, values set,
/// then instances removed.
#[derive(Debug, Default, Deserialize, JsonSchema)]
struct Edits {
    /// Repeating group keys to add one instance to.
    #[serde(default)]
    add_instances: Vec<String>,
    /// Field key to the full list of form values.
    #[serde(default)]
    values: BTreeMap<String, Vec<String>>,
    /// Instances to drop.
    #[serde(default)]
    remove_instances: Vec<InstanceRef>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct InstanceRef {
    group: String,
    index: usize,
}

/// Keeps the submitted response for the caller.
#[derive(Default)]
struct Captured {
    response: Option<QuestionnaireResponse>,
}

impl SubmitHooks for Captured {
    fn on_submit(&mut self, response: &QuestionnaireResponse) {
        self.response = Some(response.clone());
    }

    fn on_error(&mut self, error: &FormError) {
        eprintln!("Submission failed: {}", error);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> CliResult<()> {
    match command {
        Command::Fields { form, format } => run_fields(&form, format),
        Command::State { form } => run_state(&form),
        Command::Submit { form, edits, out } => run_submit(&form, edits.as_deref(), out.as_deref()),
        Command::Fill { form, out } => run_fill(&form, out.as_deref()),
        Command::Schema { kind } => run_schema(kind),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let contents = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn open_session(args: &FormArgs) -> CliResult<FormSession> {
    let response: QuestionnaireResponse = read_json(&args.response)?;
    let questionnaire: Questionnaire = match &args.questionnaire {
        Some(path) => read_json(path)?,
        None => response
            .contained_questionnaire()?
            .ok_or(CliError::NoQuestionnaire)?,
    };
    let options: FormOptions = match &args.config {
        Some(path) => read_json(path)?,
        None => FormOptions::default(),
    };
    tracing::debug!(
        questionnaire = questionnaire.url.as_deref().unwrap_or("<unnamed>"),
        read_only = options.read_only,
        "opening form"
    );
    Ok(FormSession::new(questionnaire, response, options))
}

fn run_fields(args: &FormArgs, format: RenderMode) -> CliResult<()> {
    let session = open_session(args)?;
    let payload = session.render();
    match format {
        RenderMode::Text => println!("{}", render_text(&payload)),
        RenderMode::Json => println!("{}", serde_json::to_string_pretty(&render_json_ui(&payload))?),
    }
    Ok(())
}

fn run_state(args: &FormArgs) -> CliResult<()> {
    let session = open_session(args)?;
    println!("{}", serde_json::to_string_pretty(session.state())?);
    Ok(())
}

fn run_submit(args: &FormArgs, edits: Option<&Path>, out: Option<&Path>) -> CliResult<()> {
    let mut session = open_session(args)?;
    let edits: Edits = match edits {
        Some(path) => read_json(path)?,
        None => Edits::default(),
    };
    apply_edits(&mut session, &edits)?;
    submit(&mut session, out)
}

fn run_fill(args: &FormArgs, out: Option<&Path>) -> CliResult<()> {
    let mut session = open_session(args)?;
    let verbosity = Verbosity::from_verbose(tracing::enabled!(tracing::Level::DEBUG));
    let stdin = io::stdin();
    Wizard::new(stdin.lock(), io::stdout(), verbosity).run(&mut session)?;
    submit(&mut session, out)
}

fn apply_edits(session: &mut FormSession, edits: &Edits) -> CliResult<()> {
    for group in &edits.add_instances {
        let index = session.add_group_instance(&group.parse()?)?;
        tracing::debug!(%group, index, "added group instance");
    }
    for (key, values) in &edits.values {
        let key: FieldKey = key.parse()?;
        session.update(&key, values.clone())?;
    }
    for instance in &edits.remove_instances {
        session.remove_group_instance(&instance.group.parse()?, instance.index)?;
    }
    Ok(())
}

fn submit(session: &mut FormSession, out: Option<&Path>) -> CliResult<()> {
    let mut hooks = Captured::default();
    match session.submit(&mut hooks)? {
        SubmitOutcome::Invalid(result) => {
            describe_validation(&result);
            Err(CliError::Invalid)
        }
        SubmitOutcome::Submitted(serialized) => {
            for diagnostic in &serialized.diagnostics {
                eprintln!("warning: {}", diagnostic);
            }
            let response = hooks.response.unwrap_or(serialized.response);
            let rendered = serde_json::to_string_pretty(&response)?;
            match out {
                Some(path) => fs::write(path, rendered)?,
                None => {
                    let mut stdout = io::stdout().lock();
                    writeln!(stdout, "{}", rendered)?;
                }
            }
            Ok(())
        }
    }
}

fn describe_validation(result: &ValidationResult) {
    println!("Validation result: invalid");
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!(
                "  {} - {}",
                error.field_key.as_deref().unwrap_or("<unknown>"),
                error.message
            );
        }
    }
    if !result.missing_required.is_empty() {
        println!(
            "Missing required answers: {}",
            result.missing_required.join(", ")
        );
    }
    if !result.unknown_fields.is_empty() {
        println!("Unknown fields: {}", result.unknown_fields.join(", "));
    }
}

fn run_schema(kind: SchemaKind) -> CliResult<()> {
    let schema = match kind {
        SchemaKind::Options => schema_for!(FormOptions),
        SchemaKind::Edits => schema_for!(Edits),
        SchemaKind::Questionnaire => schema_for!(Questionnaire),
        SchemaKind::Response => schema_for!(QuestionnaireResponse),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
