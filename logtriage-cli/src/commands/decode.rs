//! `logtriage decode` and `logtriage encrypt` command handlers

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tracing::info;

use logtriage_core::config::TriageConfig;
use logtriage_log_pipeline::decoder::cipher;
use logtriage_log_pipeline::{ContainerDecoder, DecodeOutcome, PipelineConfig};

use crate::cli::{DecodeArgs, EncryptArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `decode` command.
///
/// Fails with [`CliError::Decode`] when no input yields a usable log.
pub async fn execute(
    args: DecodeArgs,
    config: &TriageConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let decoder = ContainerDecoder::new(PipelineConfig::from_core(config))?;
    tokio::fs::create_dir_all(&args.out).await?;

    info!(files = args.files.len(), out = %args.out.display(), "decoding inputs");

    let mut entries = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let outcome = decoder.process(file, &args.out).await;
        entries.push(DecodeEntry::new(file, outcome));
    }

    let report = DecodeReport {
        out_dir: args.out.display().to_string(),
        usable: entries.iter().filter(|e| e.log.is_some()).count(),
        files: entries,
    };
    writer.render(&report)?;

    if report.usable == 0 {
        return Err(CliError::Decode(format!(
            "no usable log in {} input file(s)",
            report.files.len()
        )));
    }
    Ok(())
}

/// Execute the `encrypt` command.
pub async fn execute_encrypt(args: EncryptArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let plain = tokio::fs::read(&args.input).await?;
    let sealed = cipher::encrypt_container(&plain);
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&args.output, &sealed).await?;

    info!(input = %args.input.display(), output = %args.output.display(), bytes = sealed.len(), "container written");

    writer.render(&EncryptReport {
        input: args.input.display().to_string(),
        output: args.output.display().to_string(),
        bytes: sealed.len(),
    })
}

#[derive(Serialize)]
pub struct DecodeReport {
    pub out_dir: String,
    pub usable: usize,
    pub files: Vec<DecodeEntry>,
}

#[derive(Serialize)]
pub struct DecodeEntry {
    pub input: String,
    /// `ok`, `suspect` or `failed`.
    pub status: &'static str,
    pub log: Option<String>,
    pub reason: Option<String>,
}

impl DecodeEntry {
    fn new(input: &Path, outcome: DecodeOutcome) -> Self {
        let status = match (&outcome.log_path, outcome.format_suspect) {
            (Some(_), false) => "ok",
            (Some(_), true) => "suspect",
            (None, _) => "failed",
        };
        Self {
            input: input.display().to_string(),
            status,
            log: outcome.log_path.map(|p| p.display().to_string()),
            reason: outcome.reason,
        }
    }
}

impl Render for DecodeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "Decoded {} of {} file(s) into {}",
            self.usable.to_string().bold(),
            self.files.len(),
            self.out_dir
        )?;
        writeln!(w)?;

        for entry in &self.files {
            let status = match entry.status {
                "ok" => entry.status.green(),
                "suspect" => entry.status.yellow(),
                _ => entry.status.red(),
            };
            writeln!(w, "  [{:<7}] {}", status, entry.input)?;
            if let Some(log) = &entry.log {
                writeln!(w, "            -> {log}")?;
            }
            if let Some(reason) = &entry.reason {
                writeln!(w, "            {}", reason.dimmed())?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct EncryptReport {
    pub input: String,
    pub output: String,
    pub bytes: usize,
}

impl Render for EncryptReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "{} {} -> {} ({} bytes)",
            "Encrypted".green(),
            self.input,
            self.output,
            self.bytes
        )
    }
}
