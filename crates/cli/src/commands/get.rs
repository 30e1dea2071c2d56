//! get command - Download files
//!
//! Downloads run on a pool of workers. Complete downloads are checked against
//! the SHA1 stored with the file.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use b2_client::Download;
use b2_core::{Error, FileDescriptor, FileRange};
use clap::Args;
use serde::Serialize;

use super::{Context, thread_count};
use crate::exit_code::ExitCode;
use crate::output::formatter::format_size;
use crate::pool::{Outcome, TransferOrchestrator};

/// Download files
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Names of the files to download
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Number of concurrent downloads [default: from config, 5]
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Output file, or directory when downloading several files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Download and verify, but throw the content away
    #[arg(long, conflicts_with = "output")]
    pub discard: bool,

    /// Only download a byte range (inclusive, e.g. 100-2000)
    #[arg(long)]
    pub range: Option<FileRange>,

    /// Treat the arguments as file IDs instead of names
    #[arg(long)]
    pub by_id: bool,

    /// Stop starting new downloads after the first failure
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Debug, Serialize)]
struct GetOutput {
    files: Vec<GetResult>,
    total_bytes: u64,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct GetResult {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Where one download goes
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Discard,
    /// This exact path
    File(PathBuf),
    /// Under this directory, at the downloaded file's name
    Dir(PathBuf),
}

/// Execute the get command
pub async fn execute(args: GetArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let targets = match plan_targets(&args) {
        Ok(t) => t,
        Err(e) => {
            formatter.error(&e);
            return ExitCode::UsageError;
        }
    };

    let bucket = match ctx.bucket(&formatter).await {
        Ok(b) => Arc::new(b),
        Err(code) => return code,
    };

    let threads = thread_count(args.threads, &ctx.config);
    let progress = formatter.progress_bar(targets.len() as u64, "Downloading");
    let received = Arc::new(AtomicU64::new(0));
    let range = args.range;
    let by_id = args.by_id;

    let pool = TransferOrchestrator::new(threads).fail_fast(args.fail_fast);
    let bar = progress.clone();
    let reports = pool
        .run(targets, move |(name, target): (String, Target)| {
            let bucket = Arc::clone(&bucket);
            let received = Arc::clone(&received);
            let bar = bar.clone();
            async move {
                let download = if by_id {
                    bucket.client().download_file_by_id(&name, range).await?
                } else {
                    bucket.download_file_by_name(&name, range).await?
                };
                let result = save(download, &target, |n| {
                    let total = received.fetch_add(n, Ordering::Relaxed) + n;
                    bar.set_message(format_size(total));
                })
                .await;
                bar.inc(1);
                result
            }
        })
        .await;
    progress.finish_and_clear();

    let mut code = ExitCode::Success;
    let mut results = Vec::with_capacity(reports.len());
    for report in reports {
        let (name, _) = report.input;
        match report.outcome {
            Outcome::Done((file, path)) => {
                if formatter.is_verbose() {
                    formatter.println(&format!(
                        "{}  {:>10}  {}",
                        file.content_sha1,
                        formatter.style_size(&format_size(file.content_length)),
                        formatter.style_file(&file.file_name)
                    ));
                }
                results.push(GetResult {
                    name: file.file_name,
                    file_id: Some(file.file_id),
                    path: path.map(|p| p.display().to_string()),
                    size_bytes: Some(file.content_length),
                    error: None,
                });
            }
            Outcome::Failed(e) => {
                formatter.error(&format!("{name}: {e}"));
                if code == ExitCode::Success {
                    code = ExitCode::from_error(&e);
                }
                results.push(GetResult {
                    name,
                    file_id: None,
                    path: None,
                    size_bytes: None,
                    error: Some(e.to_string()),
                });
            }
            Outcome::Skipped => results.push(GetResult {
                name,
                file_id: None,
                path: None,
                size_bytes: None,
                error: Some("skipped after an earlier failure".to_string()),
            }),
        }
    }

    let total_bytes = results.iter().filter_map(|r| r.size_bytes).sum();
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if formatter.is_json() {
        formatter.json(&GetOutput {
            files: results,
            total_bytes,
            failed,
        });
    } else if failed == 0 {
        formatter.success(&format!(
            "Downloaded {} file(s), {}",
            results.len(),
            format_size(total_bytes)
        ));
    }

    code
}

/// Pair every requested file with its destination
fn plan_targets(args: &GetArgs) -> Result<Vec<(String, Target)>, String> {
    if args.discard {
        return Ok(args
            .files
            .iter()
            .map(|f| (f.clone(), Target::Discard))
            .collect());
    }

    let dir = match &args.output {
        Some(out) if args.files.len() == 1 && !out.is_dir() => {
            return Ok(vec![(args.files[0].clone(), Target::File(out.clone()))]);
        }
        Some(out) if out.exists() && !out.is_dir() => {
            return Err(format!(
                "Single (existing) output file specified for multiple targets: {}",
                out.display()
            ));
        }
        Some(out) => out.clone(),
        None => PathBuf::from("."),
    };

    if args.by_id {
        return Ok(args
            .files
            .iter()
            .map(|id| (id.clone(), Target::Dir(dir.clone())))
            .collect());
    }

    args.files
        .iter()
        .map(|name| {
            let rel = safe_relative_path(name)
                .ok_or_else(|| format!("Refusing to write outside the output directory: {name}"))?;
            Ok((name.clone(), Target::File(dir.join(rel))))
        })
        .collect()
}

/// Turn a file name into a relative path without `..` or root components
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!path.as_os_str().is_empty()).then_some(path)
}

/// Write one download to its target, removing partial files on failure
async fn save(
    download: Download,
    target: &Target,
    progress: impl FnMut(u64),
) -> b2_core::Result<(FileDescriptor, Option<PathBuf>)> {
    let path = match target {
        Target::Discard => {
            let file = download
                .write_to_with(&mut tokio::io::sink(), progress)
                .await?;
            return Ok((file, None));
        }
        Target::File(path) => path.clone(),
        Target::Dir(dir) => {
            let name = &download.file().file_name;
            let rel = safe_relative_path(name).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Refusing to write outside the output directory: {name}"
                ))
            })?;
            dir.join(rel)
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut out = tokio::fs::File::create(&path).await?;
    match download.write_to_with(&mut out, progress).await {
        Ok(file) => Ok((file, Some(path))),
        Err(e) => {
            drop(out);
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %rm, "Failed to remove partial download");
            }
            Err(e)
        }
    }
}
