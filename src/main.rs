use clap::{Parser, Subcommand, ValueEnum};
use eyre::{Result, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use heartguard::encoding::{default_record, validate_record, EncodingKind, InputEncoding};
use heartguard::model::{train, TrainerConfig};
use heartguard::patient::{PatientRecord, FEATURE_COLUMNS};
use heartguard::pipeline::PredictionPipeline;

#[derive(Parser)]
#[command(
    name = "heartguard",
    version,
    about = "Heart disease risk prediction from patient vitals (logistic regression refitted per request)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP form and JSON API
    Serve {
        /// Address to bind to
        #[arg(long, env = "HEARTGUARD_BIND", default_value = "127.0.0.1:8080")]
        bind: String,

        /// Training CSV
        #[arg(long, env = "HEARTGUARD_DATASET", default_value = heartguard::dataset::DEFAULT_DATASET_PATH)]
        dataset: PathBuf,

        /// How the form offers the binary fields
        #[arg(long, env = "HEARTGUARD_ENCODING", value_enum, default_value_t = EncodingKind::Labeled)]
        encoding: EncodingKind,

        /// Rate limit in requests per minute per IP (0 = no limit)
        #[arg(long, env = "HEARTGUARD_RATE_LIMIT", default_value_t = 60)]
        rate_limit: u32,

        /// Path for JSONL access log
        #[arg(long, env = "HEARTGUARD_ACCESS_LOG", default_value = "heartguard-access.jsonl")]
        access_log: String,

        /// Reload the dataset when its modification time changes
        #[arg(long, env = "HEARTGUARD_RELOAD_ON_CHANGE")]
        reload_on_change: bool,
    },

    /// Run one prediction and print the assessment
    Predict {
        /// Training CSV
        #[arg(long, env = "HEARTGUARD_DATASET", default_value = heartguard::dataset::DEFAULT_DATASET_PATH)]
        dataset: PathBuf,

        /// JSON file with the 13 patient fields (form defaults if omitted)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Override one field, e.g. `--set age=61 --set sex=Female` (repeatable)
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_field_override)]
        overrides: Vec<(String, String)>,

        /// How `--set` values for sex, fbs and exang are spelled
        #[arg(long, env = "HEARTGUARD_ENCODING", value_enum, default_value_t = EncodingKind::Labeled)]
        encoding: EncodingKind,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// Validate a dataset and show its summary and fitted coefficients
    Inspect {
        /// Training CSV
        #[arg(long, env = "HEARTGUARD_DATASET", default_value = heartguard::dataset::DEFAULT_DATASET_PATH)]
        dataset: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

fn cmd_serve(
    bind: String,
    dataset: PathBuf,
    encoding: EncodingKind,
    rate_limit: u32,
    access_log: String,
    reload_on_change: bool,
) -> Result<()> {
    use heartguard::server::{run_server, ServerConfig};

    let bind_addr = bind
        .parse()
        .wrap_err_with(|| format!("Invalid bind address: {}", bind))?;

    let config = ServerConfig {
        bind_addr,
        dataset_path: dataset,
        encoding,
        reload_on_change,
        rate_limit_rpm: rate_limit,
        access_log_path: access_log,
        ..Default::default()
    };

    eprintln!("Starting HeartGuard prediction service...");
    eprintln!("Dataset: {}", config.dataset_path.display());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_server(config))?;

    Ok(())
}

fn load_patient(input: Option<&Path>) -> Result<PatientRecord> {
    let Some(path) = input else {
        return Ok(default_record());
    };
    let content =
        fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let record: PatientRecord = serde_json::from_str(&content)
        .wrap_err_with(|| format!("Invalid patient JSON in {}", path.display()))?;
    validate_record(&record)?;
    Ok(record)
}

fn parse_field_override(s: &str) -> std::result::Result<(String, String), String> {
    let (field, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{s}'"))?;
    Ok((field.trim().to_string(), value.trim().to_string()))
}

fn cmd_predict(
    dataset: PathBuf,
    input: Option<PathBuf>,
    overrides: Vec<(String, String)>,
    encoding: EncodingKind,
    format: OutputFormat,
) -> Result<()> {
    let base = load_patient(input.as_deref())?;
    let record = encoding.adapter().overlay(&base, &overrides)?;
    let outcome = heartguard::predict(&dataset, &record)?;
    let a = &outcome.assessment;

    match format {
        OutputFormat::Json => {
            let result = serde_json::json!({
                "success": true,
                "patient": outcome.record,
                "assessment": a,
                "converged": outcome.model.converged(),
                "dataset_fingerprint": outcome.dataset_fingerprint,
                "processing_time_ms": outcome.elapsed_ms,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Summary => {
            println!("Heart Disease Risk Assessment");
            println!("=============================");
            println!("{}", a.headline);
            println!("Confidence: {}", a.confidence_text);
            println!("{}", a.advisory);
            println!();
            println!("Label:      {} ({})", a.label.index(), a.label.as_str());
            println!("Converged:  {}", outcome.model.converged());
            println!("Dataset:    {}", outcome.dataset_fingerprint);
        }
    }
    Ok(())
}

fn cmd_inspect(dataset: PathBuf, format: OutputFormat) -> Result<()> {
    let pipeline = PredictionPipeline::new(
        std::sync::Arc::default(),
        dataset,
        TrainerConfig::default(),
    );
    let ds = pipeline.dataset()?;
    let model = train(&ds, pipeline.trainer())?;
    let (no_disease, disease) = ds.class_counts();

    match format {
        OutputFormat::Json => {
            let weights: serde_json::Map<String, serde_json::Value> = FEATURE_COLUMNS
                .iter()
                .zip(model.weights().iter())
                .map(|(name, w)| (name.to_string(), serde_json::json!(w)))
                .collect();
            let result = serde_json::json!({
                "path": ds.source().display().to_string(),
                "fingerprint": ds.fingerprint(),
                "rows": ds.len(),
                "columns": ds.column_names(),
                "class_counts": { "no_disease": no_disease, "disease": disease },
                "model": {
                    "weights": weights,
                    "intercept": model.intercept(),
                    "converged": model.converged(),
                    "trainer": model.config(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Summary => {
            println!("Dataset:     {}", ds.source().display());
            println!("Fingerprint: {}", ds.fingerprint());
            println!("Rows:        {}", ds.len());
            println!("Columns:     {}", ds.n_columns());
            println!("Targets:     {} no disease, {} disease", no_disease, disease);
            println!();
            println!("Coefficients (converged: {}):", model.converged());
            for (name, w) in FEATURE_COLUMNS.iter().zip(model.weights().iter()) {
                println!("  {:<10} {:>10.4}", name, w);
            }
            println!("  {:<10} {:>10.4}", "intercept", model.intercept());
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            bind,
            dataset,
            encoding,
            rate_limit,
            access_log,
            reload_on_change,
        } => cmd_serve(
            bind,
            dataset,
            encoding,
            rate_limit,
            access_log,
            reload_on_change,
        ),
        Commands::Predict {
            dataset,
            input,
            overrides,
            encoding,
            format,
        } => cmd_predict(dataset, input, overrides, encoding, format),
        Commands::Inspect { dataset, format } => cmd_inspect(dataset, format),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_accepts_repeated_field_overrides() {
        let cli = Cli::try_parse_from([
            "heartguard",
            "predict",
            "--dataset",
            "heart.csv",
            "--set",
            "age=61",
            "--set",
            "sex = Female",
        ])
        .unwrap();
        let Commands::Predict { overrides, encoding, .. } = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(
            overrides,
            vec![
                ("age".to_string(), "61".to_string()),
                ("sex".to_string(), "Female".to_string()),
            ]
        );
        let record = encoding.adapter().overlay(&default_record(), &overrides).unwrap();
        assert_eq!(record.age, 61.0);
        assert_eq!(record.sex, 0.0);
    }

    #[test]
    fn test_override_without_equals_is_rejected() {
        assert!(parse_field_override("age").is_err());
        assert!(Cli::try_parse_from(["heartguard", "predict", "--set", "age"]).is_err());
    }
}
