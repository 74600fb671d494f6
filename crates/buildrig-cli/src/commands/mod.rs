// Subcommand implementations

pub mod run;
pub mod tree;
pub mod wait;

use std::time::Duration;

use clap::Args;

use buildrig_config::{HarnessSettings, PollSettings};
use buildrig_poll::RetryPolicy;
use buildrig_process::HarnessConfig;

/// Poll loop bounds; unset flags fall back to settings
#[derive(Args, Debug, Clone, Default)]
pub struct PollArgs {
    /// Delay between attempts
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Give up after this many attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Give up after this long
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl PollArgs {
    pub fn policy(&self, settings: &PollSettings) -> RetryPolicy {
        let mut policy = RetryPolicy::fixed_ms(self.backoff_ms.unwrap_or(settings.backoff_ms));
        policy.max_attempts = self.max_attempts.or(settings.max_attempts);
        policy.timeout = self
            .timeout_ms
            .or(settings.timeout_ms)
            .map(Duration::from_millis);
        policy
    }
}

pub fn harness_config(settings: &HarnessSettings) -> HarnessConfig {
    HarnessConfig::new()
        .debug(settings.debug)
        .log_prefix(&settings.log_prefix)
        .mirror_stderr(settings.mirror_stderr)
        .keep_on_fail(settings.keep_on_fail)
        .reap_timeout(Duration::from_millis(settings.reap_timeout_ms))
}
