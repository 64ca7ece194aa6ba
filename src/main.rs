mod batch;
mod db;
mod error;
mod export;
mod parser;
mod settings;
mod source;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use batch::{BatchSummary, Document, RunContext};
use parser::{Engine, Profile};

#[derive(Parser)]
#[command(name = "contract_extractor", about = "Extract buyer fields from contract PDFs into a report")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fields from documents and write the report
    Extract {
        /// PDF or text files, processed in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Catalog profile (overrides EXTRATOR_PROFILE / extrator.toml)
        #[arg(short, long, value_enum)]
        profile: Option<Profile>,
        /// Report path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Name recorded with the run
        #[arg(long)]
        operator: Option<String>,
        /// Do not store the run in the history database
        #[arg(long)]
        no_db: bool,
        /// Rows to preview on the console
        #[arg(long)]
        preview: Option<usize>,
    },
    /// List the rules of a profile
    Rules {
        #[arg(short, long, value_enum)]
        profile: Option<Profile>,
    },
    /// Show stored records
    History {
        /// Only records of this run
        #[arg(short, long)]
        run: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show run and field statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = settings::Settings::load()?;

    let result = match cli.command {
        Commands::Extract {
            files,
            profile,
            output,
            operator,
            no_db,
            preview,
        } => {
            let profile = profile.unwrap_or(settings.profile);
            let engine = Engine::with_profile(profile).context("Rule catalog is invalid")?;
            let ctx = RunContext::new(operator.unwrap_or(settings.operator));
            let docs: Vec<Document> = files.iter().map(Document::from_path).collect();

            println!("Extracting {} documents (profile: {})...", docs.len(), profile);
            let records = batch::run_batch(&engine, &ctx, &docs, true);
            BatchSummary::of(&records).print();

            let output = output.unwrap_or(settings.output);
            export::write_csv(&records, &output)?;
            println!("Report written to {:?}", output);

            if !no_db {
                let conn = db::connect(&settings.db_path)?;
                db::init_schema(&conn)?;
                db::save_run(&conn, &ctx, profile.as_str(), &records)?;
                info!(run_id = %ctx.run_id, "Run saved to {:?}", settings.db_path);
            }

            println!();
            export::print_preview(&records, preview.unwrap_or(settings.preview_rows));
            Ok(())
        }
        Commands::Rules { profile } => {
            let profile = profile.unwrap_or(settings.profile);
            let engine = Engine::with_profile(profile).context("Rule catalog is invalid")?;
            let rules = engine.rules();
            println!(
                "Profile {} (catalog v{}) | cleanup: {} | sex inference: {}",
                rules.name(),
                rules.version(),
                if rules.cleanup().is_some() { "on" } else { "off" },
                if rules.infers_sex() { "on" } else { "off" },
            );
            println!("{}", "-".repeat(80));
            for rule in rules.rules() {
                println!("{:<22} {}", rule.field, rule.pattern.source());
            }
            if let Some(markers) = rules.cleanup() {
                println!("\nTruncation markers: {}", markers.markers().join(", "));
            }
            Ok(())
        }
        Commands::History { run, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;

            if run.is_none() {
                let runs = db::fetch_runs(&conn, 5)?;
                if runs.is_empty() {
                    println!("No runs stored. Run 'extract' first.");
                    return Ok(());
                }
                println!(
                    "{:<16} | {:<8} | {:<14} | {:>5} | {:>6} | {}",
                    "Run", "Profile", "Operator", "Docs", "Errors", "Created"
                );
                println!("{}", "-".repeat(80));
                for r in &runs {
                    println!(
                        "{:<16} | {:<8} | {:<14} | {:>5} | {:>6} | {}",
                        r.run_id,
                        r.profile,
                        export::truncate(&r.operator, 14),
                        r.documents,
                        r.degraded,
                        r.created_at
                    );
                }
                println!();
            }

            let rows = db::fetch_records(&conn, run.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No records found.");
                return Ok(());
            }

            println!(
                "{:<16} | {:>3} | {:<24} | {:<24} | {:<14} | {:<16} | {}",
                "Run", "#", "Arquivo", "Nome", "CPF", "Valor Total", "Erro"
            );
            println!("{}", "-".repeat(120));
            for r in &rows {
                let col = |key: &str| r.get(key).unwrap_or("");
                println!(
                    "{:<16} | {:>3} | {:<24} | {:<24} | {:<14} | {:<16} | {}",
                    r.run_id,
                    r.position + 1,
                    export::truncate(col("Arquivo"), 24),
                    export::truncate(col("Nome"), 24),
                    col("CPF"),
                    col("Valor Total"),
                    col("Erro"),
                );
            }
            println!("\n{} records", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:      {}", s.runs);
            println!("Documents: {}", s.documents);
            println!("Errors:    {}", s.degraded);
            if !s.not_found.is_empty() {
                println!("\n--- Not found ---");
                for (field, n) in &s.not_found {
                    println!("  {:<22} {}", field, n);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
