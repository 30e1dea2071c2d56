//! delete command - Delete or hide files
//!
//! `name` deletes the most recent version of a file, `name:fileId` deletes
//! that exact version. With `--hide` the name is hidden instead and every
//! version stays stored.

use b2_client::Bucket;
use b2_core::{Error, Result};
use clap::Args;
use serde::Serialize;

use super::Context;
use crate::exit_code::ExitCode;

/// Delete or hide files
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Files to delete, as `name` or `name:fileId`
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Hide the file, leaving previous versions in place
    #[arg(long, conflicts_with = "all")]
    pub hide: bool,

    /// Delete every version of the file
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    deleted: Vec<DeletedVersion>,
    hidden: Vec<String>,
    failed: usize,
}

#[derive(Debug, Serialize, PartialEq)]
struct DeletedVersion {
    name: String,
    file_id: String,
}

/// What to do with one argument
#[derive(Debug, PartialEq)]
enum Request<'a> {
    Version { name: &'a str, file_id: &'a str },
    Hide(&'a str),
    Latest(&'a str),
    AllVersions(&'a str),
}

impl<'a> Request<'a> {
    fn parse(arg: &'a str, hide: bool, all: bool) -> Self {
        if let Some((name, file_id)) = arg.split_once(':') {
            return Request::Version { name, file_id };
        }
        match (hide, all) {
            (true, _) => Request::Hide(arg),
            (false, true) => Request::AllVersions(arg),
            (false, false) => Request::Latest(arg),
        }
    }
}

/// Execute the delete command
pub async fn execute(args: DeleteArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let bucket = match ctx.bucket(&formatter).await {
        Ok(b) => b,
        Err(code) => return code,
    };

    let mut output = DeleteOutput {
        deleted: Vec::new(),
        hidden: Vec::new(),
        failed: 0,
    };
    let mut code = ExitCode::Success;

    for arg in &args.files {
        let request = Request::parse(arg, args.hide, args.all);
        tracing::debug!(request = ?request, "Deleting");

        let result = match request {
            Request::Version { name, file_id } => bucket
                .delete_file_version(name, file_id)
                .await
                .map(|()| {
                    vec![DeletedVersion {
                        name: name.to_string(),
                        file_id: file_id.to_string(),
                    }]
                }),
            Request::Hide(name) => match bucket.hide_file(name).await {
                Ok(_) => {
                    output.hidden.push(name.to_string());
                    if formatter.is_verbose() {
                        formatter.println(&format!("hidden  {}", formatter.style_file(name)));
                    }
                    continue;
                }
                Err(e) => Err(e),
            },
            Request::Latest(name) => delete_versions(&bucket, name, false).await,
            Request::AllVersions(name) => delete_versions(&bucket, name, true).await,
        };

        match result {
            Ok(deleted) => {
                if formatter.is_verbose() {
                    for version in &deleted {
                        formatter.println(&format!(
                            "deleted {}  {}",
                            formatter.style_file(&version.name),
                            version.file_id
                        ));
                    }
                }
                output.deleted.extend(deleted);
            }
            Err(e) => {
                formatter.error(&format!("{arg}: {e}"));
                output.failed += 1;
                if code == ExitCode::Success {
                    code = ExitCode::from_error(&e);
                }
            }
        }
    }

    if formatter.is_json() {
        formatter.json(&output);
    } else if output.failed == 0 {
        let mut message = format!("Deleted {} version(s)", output.deleted.len());
        if !output.hidden.is_empty() {
            message = format!("{message}, hid {} file(s)", output.hidden.len());
        }
        formatter.success(&message);
    }

    code
}

/// Delete the newest version of `name`, or all of them
///
/// Versions are listed newest first starting at `name`; the listing moves on
/// to other names once this one's versions are exhausted.
async fn delete_versions(bucket: &Bucket, name: &str, all: bool) -> Result<Vec<DeletedVersion>> {
    let page_size = if all { 1000 } else { 1 };
    let mut pages = bucket.file_versions(page_size).starting_at(name);
    let mut deleted = Vec::new();

    'pages: while let Some(page) = pages.next_page().await? {
        for file in page {
            if file.file_name != name {
                break 'pages;
            }
            bucket.delete_file_version(name, &file.file_id).await?;
            deleted.push(DeletedVersion {
                name: file.file_name,
                file_id: file.file_id,
            });
            if !all {
                break 'pages;
            }
        }
    }

    if deleted.is_empty() {
        return Err(Error::NotFound(format!("File not found: {name}")));
    }
    Ok(deleted)
}
