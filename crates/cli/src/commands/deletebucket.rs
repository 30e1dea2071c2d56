//! deletebucket command - Delete an empty bucket

use clap::Args;
use serde::Serialize;

use super::Context;
use crate::exit_code::ExitCode;

/// Delete an empty bucket
#[derive(Args, Debug)]
pub struct DeleteBucketArgs {
    /// Name of the bucket
    pub name: String,
}

#[derive(Debug, Serialize)]
struct DeleteBucketOutput {
    name: String,
    deleted: bool,
}

/// Execute the deletebucket command
pub async fn execute(args: DeleteBucketArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let client = match ctx.client(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = match client.bucket(&args.name).await {
        Ok(bucket) => bucket.delete().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&DeleteBucketOutput {
                    name: args.name,
                    deleted: true,
                });
            } else {
                formatter.success(&format!(
                    "Bucket '{}' deleted.",
                    formatter.style_name(&args.name)
                ));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Failed to delete bucket '{}': {e}", args.name));
            ExitCode::from_error(&e)
        }
    }
}
