//! Per-invocation facts handed to the handler.

use serde::Serialize;
use std::collections::BTreeMap;
use std::env;

/// What the handler knows about the current invocation.
///
/// Built once per invocation from the Lambda runtime context and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvocationContext {
    /// Function name; also names the invocation's root segment.
    pub function_name: String,
    /// Account id from the function ARN, `None` unless numeric.
    pub aws_account_id: Option<u64>,
    /// Region from the function ARN.
    pub aws_region: Option<String>,
    /// Environment snapshot taken when the invocation started.
    #[serde(skip)]
    pub env: BTreeMap<String, String>,

    pub request_id: String,
    pub invoked_function_arn: String,
    /// Execution deadline in epoch milliseconds.
    pub deadline_ms: u64,
    pub xray_trace_id: Option<String>,
    pub function_version: String,
    pub memory_limit_mb: i32,
    pub log_group: String,
    pub log_stream: String,
}

impl InvocationContext {
    pub fn from_lambda(context: &lambda_runtime::Context) -> Self {
        let arn = &context.invoked_function_arn;
        let parts: Vec<&str> = arn.split(':').collect();
        let arn_part = |index: usize| parts.get(index).copied().filter(|p| !p.is_empty());

        // arn:aws:lambda:<region>:<account>:function:<name>[:<qualifier>]
        let function_name = if context.env_config.function_name.is_empty() {
            arn_part(6).unwrap_or_default().to_string()
        } else {
            context.env_config.function_name.clone()
        };

        Self {
            function_name,
            aws_account_id: arn_part(4).and_then(|account| account.parse().ok()),
            aws_region: arn_part(3).map(str::to_string),
            env: env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
            request_id: context.request_id.clone(),
            invoked_function_arn: arn.clone(),
            deadline_ms: context.deadline,
            xray_trace_id: context.xray_trace_id.clone(),
            function_version: context.env_config.version.clone(),
            memory_limit_mb: context.env_config.memory,
            log_group: context.env_config.log_group.clone(),
            log_stream: context.env_config.log_stream.clone(),
        }
    }

    /// Environment variable as seen when the invocation started.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}
