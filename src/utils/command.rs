/// Functions and structs for working with creating command-line arguments

use anyhow::{anyhow, Result};
use tokio::process::Command;

use crate::config::defs::{PipelineError, RSCRIPT_TAG, WEBLOGO_TAG};
use crate::utils::streams::{read_child_output_to_vec, ChildStream};

pub mod weblogo {
    use std::path::Path;
    use anyhow::{anyhow, Result};
    use tokio::process::Command;
    use crate::config::defs::WEBLOGO_TAG;
    use crate::utils::streams::{read_child_output_to_vec, ChildStream};

    pub async fn weblogo_presence_check() -> Result<String> {
        let args: Vec<&str> = vec!["--version"];

        let mut child = Command::new(WEBLOGO_TAG)
            .args(&args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}. Is weblogo installed?", WEBLOGO_TAG, e))?;

        let lines = read_child_output_to_vec(&mut child, ChildStream::Stdout).await?;
        child.wait().await?;
        let first_line = lines
            .first()
            .ok_or_else(|| anyhow!("No output from weblogo --version"))?;
        let version = first_line
            .split_whitespace()
            .last()
            .ok_or_else(|| anyhow!("Invalid weblogo --version output: {}", first_line))?
            .to_string();
        if version.is_empty() {
            return Err(anyhow!("Empty version number in weblogo --version output: {}", first_line));
        }
        Ok(version)
    }

    pub fn arg_generator(
        input_fasta: &Path,
        output_logo: &Path,
        format: &str,
        dpi: u32,
        title: &str,
        annotate: Option<&str>,
        first_index: i64,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-f".to_string());
        args_vec.push(input_fasta.to_string_lossy().to_string());
        args_vec.push("-o".to_string());
        args_vec.push(output_logo.to_string_lossy().to_string());
        args_vec.push("--format".to_string());
        args_vec.push(format.to_string());
        args_vec.push("--resolution".to_string());
        args_vec.push(dpi.to_string());
        args_vec.push("--title".to_string());
        args_vec.push(title.to_string());
        args_vec.push("--xlabel".to_string());
        args_vec.push("Position relative to TSS".to_string());
        args_vec.push("--units".to_string());
        args_vec.push("bits".to_string());
        args_vec.push("--size".to_string());
        args_vec.push("large".to_string());
        args_vec.push("--number-interval".to_string());
        args_vec.push("5".to_string());

        match annotate {
            Some(labels) => {
                args_vec.push("--annotate".to_string());
                args_vec.push(labels.to_string());
            }
            None => {
                args_vec.push("--first-index".to_string());
                args_vec.push(first_index.to_string());
            }
        }

        args_vec
    }
}

pub mod rscript {
    use std::path::Path;
    use anyhow::{anyhow, Result};
    use tokio::process::Command;
    use crate::config::defs::RSCRIPT_TAG;
    use crate::utils::streams::{read_child_output_to_vec, ChildStream};

    pub async fn rscript_presence_check() -> Result<String> {
        let args: Vec<&str> = vec!["--version"];

        let mut child = Command::new(RSCRIPT_TAG)
            .args(&args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}. Is R installed?", RSCRIPT_TAG, e))?;

        // Rscript historically prints its version to stderr
        let mut lines = read_child_output_to_vec(&mut child, ChildStream::Stderr).await?;
        if lines.is_empty() {
            lines = read_child_output_to_vec(&mut child, ChildStream::Stdout).await?;
        }
        child.wait().await?;
        let first_line = lines
            .first()
            .ok_or_else(|| anyhow!("No output from Rscript --version"))?;
        let version = first_line
            .split_whitespace()
            .last()
            .ok_or_else(|| anyhow!("Invalid Rscript --version output: {}", first_line))?
            .to_string();
        Ok(version)
    }

    pub fn arg_generator(
        script: &Path,
        counts_csv: &Path,
        metadata_csv: &Path,
        results_csv: &Path,
    ) -> Vec<String> {
        vec![
            script.to_string_lossy().to_string(),
            counts_csv.to_string_lossy().to_string(),
            metadata_csv.to_string_lossy().to_string(),
            results_csv.to_string_lossy().to_string(),
        ]
    }
}

pub async fn check_version(tool: &str) -> Result<String> {
    let version = match tool {
        WEBLOGO_TAG => weblogo::weblogo_presence_check().await,
        RSCRIPT_TAG => rscript::rscript_presence_check().await,
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };
    Ok(version?)
}

/// Runs an external tool to completion; non-zero exit surfaces stderr.
pub async fn run_tool(tool: &str, args: Vec<String>) -> Result<(), PipelineError> {
    let mut child = Command::new(tool)
        .args(&args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            message: format!("failed to spawn: {}", e),
        })?;

    let stderr_lines = read_child_output_to_vec(&mut child, ChildStream::Stderr)
        .await
        .unwrap_or_default();
    let status = child.wait().await.map_err(|e| PipelineError::ToolExecution {
        tool: tool.to_string(),
        message: e.to_string(),
    })?;

    if !status.success() {
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            message: stderr_lines.join("\n"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_weblogo_args_with_annotation() {
        let args = weblogo::arg_generator(
            &PathBuf::from("in.fa"),
            &PathBuf::from("out.pdf"),
            "pdf",
            600,
            "sample | chrom",
            Some("-2,-1,+1"),
            -40,
        );
        assert!(args.contains(&"--annotate".to_string()));
        assert!(!args.contains(&"--first-index".to_string()));
        assert_eq!(args[args.len() - 1], "-2,-1,+1");
    }

    #[test]
    fn test_weblogo_args_fallback_index() {
        let args = weblogo::arg_generator(
            &PathBuf::from("in.fa"),
            &PathBuf::from("out.pdf"),
            "pdf",
            600,
            "t",
            None,
            -40,
        );
        let idx = args.iter().position(|a| a == "--first-index").unwrap();
        assert_eq!(args[idx + 1], "-40");
    }

    #[tokio::test]
    async fn test_run_tool_failure_captures_stderr() {
        let err = run_tool("false", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("false"));
    }
}
