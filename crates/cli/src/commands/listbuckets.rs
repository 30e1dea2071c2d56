//! listbuckets command - List the buckets of the account

use b2_core::{BucketInfo, BucketType};
use clap::Args;
use serde::Serialize;

use super::Context;
use crate::exit_code::ExitCode;

/// List the buckets of the account
#[derive(Args, Debug)]
pub struct ListBucketsArgs {
    /// Show bucket IDs and types
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Debug, Serialize)]
struct ListBucketsOutput {
    buckets: Vec<BucketEntry>,
}

#[derive(Debug, Serialize)]
struct BucketEntry {
    name: String,
    id: String,
    #[serde(rename = "type")]
    bucket_type: BucketType,
}

impl From<BucketInfo> for BucketEntry {
    fn from(info: BucketInfo) -> Self {
        Self {
            name: info.bucket_name,
            id: info.bucket_id,
            bucket_type: info.bucket_type,
        }
    }
}

/// Execute the listbuckets command
pub async fn execute(args: ListBucketsArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let client = match ctx.client(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let mut buckets: Vec<BucketEntry> = match client.list_buckets().await {
        Ok(b) => b.into_iter().map(BucketEntry::from).collect(),
        Err(e) => {
            formatter.error(&format!("Failed to list buckets: {e}"));
            return ExitCode::from_error(&e);
        }
    };
    buckets.sort_by(|a, b| a.name.cmp(&b.name));

    if formatter.is_json() {
        formatter.json(&ListBucketsOutput { buckets });
    } else if args.long {
        let rows = buckets
            .iter()
            .map(|b| {
                vec![
                    formatter.style_name(&b.name),
                    b.id.clone(),
                    b.bucket_type.to_string(),
                ]
            })
            .collect();
        formatter.table(&["Name", "ID", "Type"], rows);
    } else {
        for bucket in &buckets {
            formatter.println(&formatter.style_name(&bucket.name));
        }
    }

    ExitCode::Success
}
