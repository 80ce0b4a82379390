//! SDC command-line interface

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;

use octofhir_sdc::{
    AnswerValue, FormStore, Questionnaire, QuestionnaireResponse, SavePolicy,
};

/// SDC form engine command-line tool
#[derive(Parser)]
#[command(name = "sdc")]
#[command(author, version, about = "FHIR Structured Data Capture (SDC) form tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a questionnaire: items, expressions, variables, tabs
    Inspect {
        /// Questionnaire JSON file
        questionnaire: PathBuf,
    },
    /// Apply answers to a questionnaire and print the updated response
    Apply {
        /// Questionnaire JSON file
        questionnaire: PathBuf,
        /// Answers as a JSON object: {"linkId": value, ...}
        #[arg(short, long)]
        answers: PathBuf,
        /// Pre-existing QuestionnaireResponse to start from
        #[arg(short, long)]
        response: Option<PathBuf>,
        /// Strip answers of disabled items (final save semantics)
        #[arg(long)]
        strip_disabled: bool,
    },
    /// Validate a response against its questionnaire
    Validate {
        /// Questionnaire JSON file
        questionnaire: PathBuf,
        /// QuestionnaireResponse JSON file
        response: PathBuf,
    },
}

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { questionnaire } => inspect(&questionnaire),
        Commands::Apply {
            questionnaire,
            answers,
            response,
            strip_disabled,
        } => apply(&questionnaire, &answers, response.as_deref(), strip_disabled),
        Commands::Validate {
            questionnaire,
            response,
        } => validate(&questionnaire, &response),
    }
}

fn load_questionnaire(path: &Path) -> Result<Questionnaire> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding {}", path.display()))
}

fn load_response(path: &Path) -> Result<QuestionnaireResponse> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding {}", path.display()))
}

fn build_store(
    questionnaire: Questionnaire,
    response: Option<QuestionnaireResponse>,
) -> Result<FormStore> {
    FormStore::build(questionnaire, response, IndexMap::new())
        .context("building form state from questionnaire")
}

fn inspect(questionnaire_path: &Path) -> Result<()> {
    let questionnaire = load_questionnaire(questionnaire_path)?;
    let title = questionnaire.title.clone().unwrap_or_else(|| "(untitled)".to_string());
    let store = build_store(questionnaire, None)?;
    let model = store.model();

    println!("Questionnaire: {title}");
    println!("  items:                  {}", model.index.link_ids().count());
    println!("  tabs:                   {}", model.tab_link_ids.len());
    println!("  enableWhen items:       {}", model.enable_when_items.len());
    println!("  enableWhen expressions: {}", model.enable_when_expressions.len());
    println!("  calculated expressions: {}", model.calculated_expressions.len());
    println!("  answer expressions:     {}", model.answer_expressions.len());
    println!(
        "  variables:              {} fhirpath, {} x-fhir-query",
        model.variables.fhirpath.len(),
        model.variables.x_fhir_query.len()
    );
    println!("  launch contexts:        {}", model.launch_contexts.len());
    println!("  contained value sets:   {}", model.processed_value_sets.len());

    if !model.calculated_expressions.is_empty() {
        println!("\nCalculated expressions:");
        for (link_id, calculated) in &model.calculated_expressions {
            println!("  {link_id}: {}", calculated.expression);
        }
    }
    if !model.enable_when_expressions.is_empty() {
        println!("\nEnableWhen expressions:");
        for (link_id, expression) in &model.enable_when_expressions {
            println!("  {link_id}: {expression}");
        }
    }
    if !store.issues().is_empty() {
        println!("\nExtraction warnings:");
        for issue in store.issues() {
            println!("  {issue}");
        }
    }
    Ok(())
}

fn apply(
    questionnaire_path: &Path,
    answers_path: &Path,
    response_path: Option<&Path>,
    strip_disabled: bool,
) -> Result<()> {
    let questionnaire = load_questionnaire(questionnaire_path)?;
    let response = response_path.map(load_response).transpose()?;
    let mut store = build_store(questionnaire, response)?;

    let answers_text = std::fs::read_to_string(answers_path)
        .with_context(|| format!("reading {}", answers_path.display()))?;
    let answers: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&answers_text).context("answers must be a JSON object")?;

    for (link_id, value) in answers {
        let values = answer_values(&value)
            .with_context(|| format!("unsupported answer value for {link_id}"))?;
        store
            .update_item_answer(&link_id, values)
            .with_context(|| format!("applying answer for {link_id}"))?;
    }

    let policy = if strip_disabled {
        SavePolicy::Final
    } else {
        SavePolicy::Draft
    };
    let response = store.response_for_save(policy);
    println!("{}", serde_json::to_string_pretty(&response)?);

    for issue in store.issues() {
        eprintln!("warning: {issue}");
    }
    Ok(())
}

fn validate(questionnaire_path: &Path, response_path: &Path) -> Result<()> {
    let questionnaire = load_questionnaire(questionnaire_path)?;
    let response = load_response(response_path)?;
    let store = build_store(questionnaire, Some(response))?;

    let invalid = store.validate();
    if invalid.is_empty() {
        println!("response is valid");
        return Ok(());
    }
    for (link_id, kind) in &invalid {
        println!("{link_id}: {kind:?}");
    }
    anyhow::bail!("{} invalid item(s)", invalid.len())
}

/// Map a JSON answer literal (or array of literals) onto typed values
fn answer_values(value: &serde_json::Value) -> Result<Vec<AnswerValue>> {
    use serde_json::Value;
    let singles: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => return Ok(Vec::new()),
        other => vec![other],
    };

    singles
        .into_iter()
        .map(|single| match single {
            Value::Bool(b) => Ok(AnswerValue::Boolean(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(AnswerValue::Integer(i32::try_from(i)?))
                } else {
                    use rust_decimal::prelude::FromPrimitive;
                    n.as_f64()
                        .and_then(rust_decimal::Decimal::from_f64)
                        .map(AnswerValue::Decimal)
                        .context("number out of range")
                }
            }
            Value::String(s) => Ok(AnswerValue::String(s.clone())),
            Value::Object(_) => {
                let coding = serde_json::from_value(single.clone())?;
                Ok(AnswerValue::Coding(coding))
            }
            other => anyhow::bail!("unsupported answer literal: {other}"),
        })
        .collect()
}
