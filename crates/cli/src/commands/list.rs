//! list command - List files in a bucket

use b2_client::MAX_PAGE_SIZE;
use b2_core::{FileAction, FileDescriptor};
use clap::Args;
use serde::Serialize;

use super::Context;
use crate::exit_code::ExitCode;
use crate::output::Formatter;
use crate::output::formatter::{format_size, format_timestamp};

/// List files in the bucket
#[derive(Args, Debug)]
pub struct ListArgs {
    /// List every version of every file, including hide markers
    #[arg(short, long)]
    pub all_versions: bool,

    /// Only list names starting with this prefix
    #[arg(long, default_value = "", conflicts_with = "all_versions")]
    pub prefix: String,

    /// Group names below this separator into folders (e.g. "/")
    #[arg(long, conflicts_with = "all_versions")]
    pub delimiter: Option<String>,

    /// Show size, upload time, action and file ID
    #[arg(short, long)]
    pub long: bool,

    /// Entries requested per API call
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u32).range(1..=MAX_PAGE_SIZE as i64))]
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
struct ListOutput {
    bucket: String,
    files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
struct FileEntry {
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    file_id: String,
    size_bytes: u64,
    action: FileAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    uploaded: Option<String>,
}

impl From<&FileDescriptor> for FileEntry {
    fn from(file: &FileDescriptor) -> Self {
        Self {
            name: file.file_name.clone(),
            file_id: file.file_id.clone(),
            size_bytes: file.content_length,
            action: file.action,
            uploaded: file.uploaded_at().map(|ts| ts.to_string()),
        }
    }
}

/// Execute the list command
pub async fn execute(args: ListArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let bucket = match ctx.bucket(&formatter).await {
        Ok(b) => b,
        Err(code) => return code,
    };

    let listed = if args.all_versions {
        bucket.file_versions(args.page_size).collect_all().await
    } else if let Some(delimiter) = args.delimiter.as_deref() {
        list_with_delimiter(&bucket, &args.prefix, delimiter, args.page_size).await
    } else {
        bucket
            .file_names(args.page_size)
            .with_prefix(args.prefix.as_str())
            .collect_all()
            .await
    };

    let files = match listed {
        Ok(files) => files,
        Err(e) => {
            formatter.error(&format!("Failed to list {}: {e}", bucket.name()));
            return ExitCode::from_error(&e);
        }
    };

    if formatter.is_json() {
        formatter.json(&ListOutput {
            bucket: bucket.name().to_string(),
            files: files.iter().map(FileEntry::from).collect(),
        });
    } else if args.long {
        print_long(&formatter, &files);
    } else {
        for file in &files {
            formatter.println(&styled_name(&formatter, file, args.all_versions));
        }
    }

    ExitCode::Success
}

/// Follow the cursor of a delimited listing
async fn list_with_delimiter(
    bucket: &b2_client::Bucket,
    prefix: &str,
    delimiter: &str,
    page_size: u32,
) -> b2_core::Result<Vec<FileDescriptor>> {
    let prefix = (!prefix.is_empty()).then_some(prefix);
    let mut files = Vec::new();
    let mut start = String::new();

    loop {
        let page = bucket
            .list_file_names_with_prefix(&start, page_size, prefix, Some(delimiter))
            .await?;
        files.extend(page.files);
        match page.next {
            Some(cursor) if !cursor.is_empty() => start = cursor.file_name,
            _ => return Ok(files),
        }
    }
}

fn styled_name(formatter: &Formatter, file: &FileDescriptor, with_id: bool) -> String {
    let name = match file.action {
        FileAction::Folder => formatter.style_folder(&file.file_name),
        _ => formatter.style_file(&file.file_name),
    };
    if with_id {
        format!("{name}:{}", file.file_id)
    } else {
        name
    }
}

fn print_long(formatter: &Formatter, files: &[FileDescriptor]) {
    let rows = files
        .iter()
        .map(|file| {
            vec![
                styled_name(formatter, file, false),
                formatter.style_size(&format_size(file.content_length)),
                formatter.style_date(&format_timestamp(file.uploaded_at())),
                file.action.to_string(),
                file.file_id.clone(),
            ]
        })
        .collect();
    formatter.table(&["Name", "Size", "Uploaded", "Action", "ID"], rows);
}
