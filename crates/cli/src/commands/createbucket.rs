//! createbucket command - Create a bucket

use b2_core::BucketType;
use clap::Args;
use serde::Serialize;

use super::Context;
use crate::exit_code::ExitCode;

/// Create a bucket
#[derive(Args, Debug)]
pub struct CreateBucketArgs {
    /// Name of the new bucket
    pub name: String,

    /// Allow anybody to download files from the bucket
    #[arg(long)]
    pub public: bool,
}

#[derive(Debug, Serialize)]
struct CreateBucketOutput {
    name: String,
    id: String,
    #[serde(rename = "type")]
    bucket_type: BucketType,
}

/// Execute the createbucket command
pub async fn execute(args: CreateBucketArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let client = match ctx.client(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let bucket_type = if args.public {
        BucketType::AllPublic
    } else {
        BucketType::AllPrivate
    };

    match client.create_bucket(&args.name, bucket_type).await {
        Ok(bucket) => {
            if formatter.is_json() {
                formatter.json(&CreateBucketOutput {
                    name: bucket.name().to_string(),
                    id: bucket.id().to_string(),
                    bucket_type: bucket.bucket_type(),
                });
            } else {
                formatter.success(&format!(
                    "Bucket '{}' created ({}).",
                    formatter.style_name(bucket.name()),
                    bucket.bucket_type()
                ));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Failed to create bucket '{}': {e}", args.name));
            ExitCode::from_error(&e)
        }
    }
}
