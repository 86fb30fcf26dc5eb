//! Bounded wait for a verification code.

use crate::clock::Clock;
use crate::error::SmsResult;
use crate::resolver::LatestCodeResolver;
use crate::types::LookupOutcome;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Polls the resolver until a code shows up or the deadline passes.
#[derive(Clone)]
pub struct WaitForCode {
    resolver: LatestCodeResolver,
}

impl WaitForCode {
    pub fn new(resolver: LatestCodeResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &LatestCodeResolver {
        &self.resolver
    }

    /// Clamp a caller-supplied timeout in seconds to `[0, max_wait]`.
    pub fn effective_timeout(&self, timeout_seconds: i64) -> Duration {
        let requested = Duration::from_secs(timeout_seconds.max(0).unsigned_abs());
        requested.min(self.resolver.policy().max_wait)
    }

    /// Wait up to `timeout_seconds` for a code.
    ///
    /// Resolves once immediately. On a miss, sleeps for one poll interval or
    /// whatever is left before the deadline, whichever is shorter, and tries
    /// again only if the deadline has not passed. A non-positive timeout
    /// makes exactly one attempt. Store errors end the wait.
    #[instrument(level = "debug", skip(self))]
    pub async fn wait(
        &self,
        phone_number: &str,
        keyword: Option<&str>,
        timeout_seconds: i64,
    ) -> SmsResult<LookupOutcome> {
        let clock = self.resolver.clock();
        let timeout = self.effective_timeout(timeout_seconds);
        let start = clock.now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|t| start.checked_add_signed(t))
            .unwrap_or(start);
        let poll_interval = self.resolver.policy().poll_interval;

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if let Some(resolution) = self.resolver.resolve(phone_number, keyword).await? {
                info!(
                    record_id = resolution.record.id,
                    attempts,
                    "Verification code found"
                );
                return Ok(LookupOutcome::Found(resolution));
            }

            let remaining = match (deadline - clock.now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining,
                _ => break,
            };

            debug!(attempt = attempts, ?remaining, "No code yet, polling again");
            clock.sleep(poll_interval.min(remaining)).await;

            if clock.now() >= deadline {
                break;
            }
        }

        debug!(attempts, "Wait deadline reached without a code");
        Ok(LookupOutcome::TimedOut)
    }
}
