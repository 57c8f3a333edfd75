// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Language drivers for workflow nodes carrying inline source.
//!
//! One shape for all three runtimes: materialize a temporary source file
//! whose prelude reads the encoded input payload, run the runtime as a
//! subprocess with the node's environment and timeout, read JSON from
//! standard output, unlink the file. The structured runtimes (Python, Node)
//! require JSON output; the shell driver wraps non-JSON output as
//! `{"output": <raw>}`.

use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use tokio::process::Command;

use crate::errors::LanguageError;
use crate::traits::{LanguageDriver, LanguageOptions};

/// Runs node source with a `process(inputs)` entry point under `python3`.
pub struct PythonDriver;

/// Runs node source with a `process(inputs)` entry point under `node`.
pub struct NodeDriver;

/// Runs shell source with inputs exposed as `INPUT_*` environment
/// variables.
pub struct BashDriver;

#[async_trait]
impl LanguageDriver for PythonDriver {
    async fn execute(
        &self,
        source: &str,
        inputs: &serde_json::Value,
        options: &LanguageOptions,
    ) -> Result<serde_json::Value, LanguageError> {
        let program = format!(
            "import json\n\
             import sys\n\
             \n\
             inputs = json.loads(sys.argv[1])\n\
             \n\
             {source}\n\
             \n\
             if 'process' in dir():\n\
             \x20   print(json.dumps(process(inputs)))\n\
             else:\n\
             \x20   print(json.dumps({{'error': 'No process function found'}}), file=sys.stderr)\n\
             \x20   sys.exit(1)\n",
            source = source,
        );

        let file = write_source(&program, ".py")?;
        let output = run_runtime(
            "python3",
            &[
                file.path().to_string_lossy().to_string(),
                inputs.to_string(),
            ],
            options,
        )
        .await?;
        parse_structured("python", &output)
    }

    fn language(&self) -> &'static str {
        "python"
    }
}

#[async_trait]
impl LanguageDriver for NodeDriver {
    async fn execute(
        &self,
        source: &str,
        inputs: &serde_json::Value,
        options: &LanguageOptions,
    ) -> Result<serde_json::Value, LanguageError> {
        // Function declarations hoist above the prelude, so the user's
        // `process` shadows the global; inputs are inlined as a literal
        let program = format!(
            "const inputs = {inputs};\n\
             \n\
             {source}\n\
             \n\
             if (typeof process === 'function') {{\n\
             \x20   console.log(JSON.stringify(process(inputs)));\n\
             }} else {{\n\
             \x20   console.error(JSON.stringify({{error: 'No process function found'}}));\n\
             \x20   require('process').exit(1);\n\
             }}\n",
            inputs = inputs,
            source = source,
        );

        let file = write_source(&program, ".js")?;
        let output = run_runtime(
            "node",
            &[file.path().to_string_lossy().to_string()],
            options,
        )
        .await?;
        parse_structured("node", &output)
    }

    fn language(&self) -> &'static str {
        "javascript"
    }
}

#[async_trait]
impl LanguageDriver for BashDriver {
    async fn execute(
        &self,
        source: &str,
        inputs: &serde_json::Value,
        options: &LanguageOptions,
    ) -> Result<serde_json::Value, LanguageError> {
        let mut options = options.clone();
        if let Some(map) = inputs.as_object() {
            for (key, value) in map {
                let rendered = match value.as_str() {
                    Some(text) => text.to_string(),
                    None => value.to_string(),
                };
                options
                    .environment
                    .insert(format!("INPUT_{}", key.to_uppercase()), rendered);
            }
        }

        let output = run_runtime("bash", &["-c".to_string(), source.to_string()], &options).await?;

        // Informal runtime: non-JSON output is legitimate shell output
        let trimmed = output.trim();
        Ok(serde_json::from_str(trimmed)
            .unwrap_or_else(|_| serde_json::json!({"output": trimmed})))
    }

    fn language(&self) -> &'static str {
        "bash"
    }
}

fn write_source(program: &str, suffix: &str) -> Result<tempfile::NamedTempFile, LanguageError> {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .map_err(|e| LanguageError::Launch {
            runtime: suffix.trim_start_matches('.').to_string(),
            message: format!("failed to materialize source file: {}", e),
        })?;
    file.write_all(program.as_bytes())
        .map_err(|e| LanguageError::Launch {
            runtime: suffix.trim_start_matches('.').to_string(),
            message: format!("failed to write source file: {}", e),
        })?;
    Ok(file)
}

async fn run_runtime(
    runtime: &str,
    args: &[String],
    options: &LanguageOptions,
) -> Result<String, LanguageError> {
    let mut command = Command::new(runtime);
    command
        .args(args)
        .envs(&options.environment)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.output();
    let output = tokio::time::timeout(options.timeout, child)
        .await
        .map_err(|_| LanguageError::Timeout {
            runtime: runtime.to_string(),
            seconds: options.timeout.as_secs_f64(),
        })?
        .map_err(|e| LanguageError::Launch {
            runtime: runtime.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(LanguageError::Execution {
            runtime: runtime.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_structured(runtime: &str, output: &str) -> Result<serde_json::Value, LanguageError> {
    serde_json::from_str(output.trim()).map_err(|e| LanguageError::Output {
        runtime: runtime.to_string(),
        message: format!("{}: {}", e, output.trim()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Bash is the one runtime the test host is guaranteed to have
    #[tokio::test]
    async fn bash_driver_exposes_inputs_as_environment() {
        let driver = BashDriver;
        let result = driver
            .execute(
                r#"echo "{\"doubled\": $((INPUT_X * 2))}""#,
                &json!({"x": 21}),
                &LanguageOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"doubled": 42}));
    }

    #[tokio::test]
    async fn bash_driver_wraps_informal_output() {
        let driver = BashDriver;
        let result = driver
            .execute("echo plain text", &json!({}), &LanguageOptions::default())
            .await
            .unwrap();
        assert_eq!(result, json!({"output": "plain text"}));
    }

    #[tokio::test]
    async fn bash_failure_carries_stderr() {
        let driver = BashDriver;
        let error = driver
            .execute(
                "echo broken >&2; exit 3",
                &json!({}),
                &LanguageOptions::default(),
            )
            .await
            .unwrap_err();
        match error {
            LanguageError::Execution { stderr, .. } => assert!(stderr.contains("broken")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_kills_the_subprocess() {
        let driver = BashDriver;
        let options = LanguageOptions {
            timeout: std::time::Duration::from_millis(100),
            ..LanguageOptions::default()
        };
        let error = driver
            .execute("sleep 10", &json!({}), &options)
            .await
            .unwrap_err();
        assert!(matches!(error, LanguageError::Timeout { .. }));
    }

    #[test]
    fn structured_output_must_be_json() {
        assert!(parse_structured("python", "{\"ok\": true}").is_ok());
        assert!(matches!(
            parse_structured("python", "not json"),
            Err(LanguageError::Output { .. })
        ));
    }

    #[test]
    fn drivers_report_their_language_tags() {
        assert_eq!(PythonDriver.language(), "python");
        assert_eq!(NodeDriver.language(), "javascript");
        assert_eq!(BashDriver.language(), "bash");
    }
}
