//! put command - Upload files
//!
//! Local paths may contain glob patterns. Files are read twice, once to hash
//! them and once to send them; standard input (`-`) is buffered in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use super::{Context, thread_count};
use crate::exit_code::ExitCode;
use crate::output::Formatter;
use crate::output::formatter::format_size;
use crate::pool::{Outcome, TransferOrchestrator};

/// Upload files
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Local files to upload (glob patterns allowed, `-` for stdin)
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Number of concurrent uploads [default: from config, 5]
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Metadata attached to every file (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,

    /// Prefix prepended to every remote name
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Remote name for data read from stdin
    #[arg(long)]
    pub name: Option<String>,

    /// Stop starting new uploads after the first failure
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    files: Vec<PutResult>,
    total_bytes: u64,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct PutResult {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One local source and the name it gets in the bucket
#[derive(Debug, Clone, PartialEq)]
enum Source {
    Stdin,
    File(PathBuf),
}

/// Execute the put command
pub async fn execute(args: PutArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let uploads = match plan_uploads(&args, &formatter) {
        Ok(u) if u.is_empty() => {
            formatter.error("No files matched");
            return ExitCode::NotFound;
        }
        Ok(u) => u,
        Err(e) => {
            formatter.error(&e);
            return ExitCode::UsageError;
        }
    };

    let bucket = match ctx.bucket(&formatter).await {
        Ok(b) => Arc::new(b),
        Err(code) => return code,
    };

    let meta: Arc<HashMap<String, String>> = Arc::new(args.meta.into_iter().collect());
    let threads = thread_count(args.threads, &ctx.config);
    let progress = formatter.progress_bar(uploads.len() as u64, "Uploading");

    let pool = TransferOrchestrator::new(threads).fail_fast(args.fail_fast);
    let bar = progress.clone();
    let reports = pool
        .run(uploads, move |(source, name): (Source, String)| {
            let bucket = Arc::clone(&bucket);
            let meta = Arc::clone(&meta);
            let bar = bar.clone();
            async move {
                let result = match source {
                    Source::Stdin => bucket.upload_stream(&name, &meta, tokio::io::stdin()).await,
                    Source::File(path) => {
                        let file = tokio::fs::File::open(&path).await?;
                        bucket.upload_file(&name, &meta, file).await
                    }
                };
                if let Ok(file) = &result {
                    bar.set_message(format_size(file.content_length));
                }
                bar.inc(1);
                result
            }
        })
        .await;
    progress.finish_and_clear();

    let mut code = ExitCode::Success;
    let mut results = Vec::with_capacity(reports.len());
    for report in reports {
        let (_, name) = report.input;
        match report.outcome {
            Outcome::Done(file) => {
                if formatter.is_verbose() {
                    formatter.println(&format!(
                        "{}  {}  {}",
                        file.file_id,
                        formatter.style_size(&format_size(file.content_length)),
                        formatter.style_file(&file.file_name)
                    ));
                }
                results.push(PutResult {
                    name: file.file_name,
                    file_id: Some(file.file_id),
                    content_sha1: Some(file.content_sha1),
                    size_bytes: Some(file.content_length),
                    error: None,
                });
            }
            Outcome::Failed(e) => {
                formatter.error(&format!("{name}: {e}"));
                if code == ExitCode::Success {
                    code = ExitCode::from_error(&e);
                }
                results.push(PutResult {
                    name,
                    file_id: None,
                    content_sha1: None,
                    size_bytes: None,
                    error: Some(e.to_string()),
                });
            }
            Outcome::Skipped => results.push(PutResult {
                name,
                file_id: None,
                content_sha1: None,
                size_bytes: None,
                error: Some("skipped after an earlier failure".to_string()),
            }),
        }
    }

    let total_bytes = results.iter().filter_map(|r| r.size_bytes).sum();
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if formatter.is_json() {
        formatter.json(&PutOutput {
            files: results,
            total_bytes,
            failed,
        });
    } else if failed == 0 {
        formatter.success(&format!(
            "Uploaded {} file(s), {}",
            results.len(),
            format_size(total_bytes)
        ));
    }

    code
}

/// Parse a `KEY=VALUE` metadata argument
fn parse_meta(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid metadata '{s}' (expected KEY=VALUE)")),
    }
}

/// Expand the arguments into sources and their remote names
///
/// Paths a pattern matched but that cannot be read are skipped with a warning.
fn plan_uploads(args: &PutArgs, formatter: &Formatter) -> Result<Vec<(Source, String)>, String> {
    let mut uploads = Vec::new();

    for arg in &args.paths {
        if arg == "-" {
            let name = args
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .ok_or("Uploading from stdin requires --name")?;
            uploads.push((Source::Stdin, format!("{}{name}", args.prefix)));
            continue;
        }

        let paths: Vec<PathBuf> = if is_glob(arg) {
            glob::glob(arg)
                .map_err(|e| format!("Invalid pattern '{arg}': {e}"))?
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        formatter.warning(&format!("Skipping {}: {}", e.path().display(), e.error()));
                        None
                    }
                })
                .filter(|p| p.is_file())
                .collect()
        } else {
            let path = PathBuf::from(arg);
            if !path.is_file() {
                return Err(format!("Not a file: {arg}"));
            }
            vec![path]
        };

        for path in paths {
            let name = format!("{}{}", args.prefix, remote_name(&path));
            uploads.push((Source::File(path), name));
        }
    }

    Ok(uploads)
}

fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Remote name of a local path: `/`-separated, without `./` or a root
fn remote_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
