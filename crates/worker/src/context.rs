//! Explicit construction-time context.
//!
//! Replaces process-wide singletons: everything an orchestrator needs to
//! know about its environment arrives through this value.

use toolscribe_analyzer::AnalyzerConfig;
use toolscribe_core::env_string_with_default;

/// Shared construction-time configuration for session workers.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// How to launch the analyzer subprocess.
    pub analyzer: AnalyzerConfig,
    /// Active observation mode, forwarded in init/continuation frames.
    pub mode: String,
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            mode: env_string_with_default("TOOLSCRIBE_MODE", "observe"),
        }
    }
}
