//! Runs the `b2` binary against the fake service
//!
//! Every harness gets its own fake server, config directory and an empty
//! bucket named [`BUCKET`].

#![allow(dead_code)]

use std::path::Path;
use std::process::Output;

use b2_client::B2Client;
use b2_core::BucketType;
use serde_json::Value;
use tempfile::TempDir;
use tokio::process::Command;
use wiremock::MockServer;

use crate::common::{ACCOUNT_ID, APP_KEY, FakeB2};

pub const BUCKET: &str = "test-bucket";

pub struct Harness {
    pub server: MockServer,
    pub fake: FakeB2,
    config_dir: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        let (server, fake) = FakeB2::start().await;

        let config_dir = TempDir::new().unwrap();
        std::fs::write(
            config_dir.path().join("config.toml"),
            format!("api_host = \"{}\"\nthreads = 5\n", server.uri()),
        )
        .unwrap();

        B2Client::new(&fake.config())
            .unwrap()
            .create_bucket(BUCKET, BucketType::AllPrivate)
            .await
            .unwrap();

        Self {
            server,
            fake,
            config_dir,
        }
    }

    /// A `b2` invocation with credentials and bucket set through the environment
    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_b2"));
        cmd.args(args)
            .env("B2_CONFIG_DIR", self.config_dir.path())
            .env("B2_ACCOUNT_ID", ACCOUNT_ID)
            .env("B2_APP_KEY", APP_KEY)
            .env("B2_BUCKET", BUCKET)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    pub async fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().await.unwrap()
    }

    pub async fn run_in(&self, dir: &Path, args: &[&str]) -> Output {
        self.command(args).current_dir(dir).output().await.unwrap()
    }

    /// Run with `--json`, require success and parse stdout
    pub async fn json(&self, args: &[&str]) -> Value {
        let mut args = args.to_vec();
        args.push("--json");
        let output = self.run(&args).await;
        parse_success(&args, output)
    }

    pub async fn json_in(&self, dir: &Path, args: &[&str]) -> Value {
        let mut args = args.to_vec();
        args.push("--json");
        let output = self.run_in(dir, &args).await;
        parse_success(&args, output)
    }
}

fn parse_success(args: &[&str], output: Output) -> Value {
    assert!(
        output.status.success(),
        "b2 {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "b2 {args:?} printed invalid JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// Exit status as the documented code
pub fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

/// Replace values that differ between runs with a fixed marker
pub fn redact(value: &mut Value, keys: &[&str]) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if keys.contains(&key.as_str()) {
                    *v = Value::String("[redacted]".to_string());
                } else {
                    redact(v, keys);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| redact(v, keys)),
        _ => {}
    }
}
