// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle function backed by a local executable.
//!
//! The payload is written to the process's stdin and the response body is
//! read from stdout. The function name and tenant id are passed as
//! `TENANTPLANE_FUNCTION_NAME` and `TENANT_ID`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use super::traits::*;

/// Runs a command once per invocation.
#[derive(Debug, Clone)]
pub struct CommandFunction {
    program: String,
    args: Vec<String>,
}

impl CommandFunction {
    /// Function running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line into program and args.
    ///
    /// Returns `None` for a blank line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    /// Program being run.
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl LifecycleFunction for CommandFunction {
    fn function_type(&self) -> &'static str {
        "command"
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("TENANTPLANE_FUNCTION_NAME", &request.function_name)
            .env("TENANT_ID", &request.tenant_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FunctionError::StartFailed(format!("{}: {}", self.program, e)))?;

        debug!(
            program = %self.program,
            function = %request.function_name,
            pid = ?child.id(),
            "Function process started"
        );

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(request.payload.as_bytes()).await {
                Ok(()) => {}
                // The process may exit without reading its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(FunctionError::Io(e)),
            }
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                program = %self.program,
                exit_code = exit_code,
                stderr = %stderr,
                "Function process failed"
            );
            return Err(FunctionError::ExitCode { exit_code, stderr });
        }

        InvokeResponse::parse(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_line() {
        let f = CommandFunction::from_command_line("  python3 rds-tenant.py --dry-run ").unwrap();
        assert_eq!(f.program(), "python3");
        assert_eq!(f.args, vec!["rds-tenant.py", "--dry-run"]);
        assert!(CommandFunction::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let f = CommandFunction::new("/nonexistent/tenantplane-fn", vec![]);
        let req = InvokeRequest {
            function_name: "fn".to_string(),
            tenant_id: "acme".to_string(),
            payload: "{}".to_string(),
        };
        assert!(matches!(
            f.invoke(&req).await,
            Err(FunctionError::StartFailed(_))
        ));
    }
}
