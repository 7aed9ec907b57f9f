pub mod crypto;
pub mod math;
pub mod serde;

use core::{convert::TryFrom, future::Future};

use anyhow::Result as AnyResult;
use chrono::offset::Utc;
use tracing::error;

/// Returns early with the given error when the condition does not hold.
#[macro_export]
macro_rules! require {
    ($condition:expr, $error:expr) => {
        if !$condition {
            return Err($error);
        }
    };
}

/// Current wall-clock time as whole seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    let timestamp = Utc::now().timestamp();
    u64::try_from(timestamp).unwrap_or_default()
}

/// Spawn a task on the runtime and abort the process if it returns an error.
pub fn spawn_or_abort<F>(future: F)
where
    F: Future<Output = AnyResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(error) = future.await {
            error!(?error, "Task failed, aborting");
            std::process::abort();
        }
    });
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn test_unix_now_is_recent() {
        // 2021-01-01 is long past and the counter is monotone enough for this.
        assert!(unix_now() > 1_609_459_200);
    }

    #[test]
    fn test_require_returns_error() {
        fn checked(flag: bool) -> Result<(), &'static str> {
            require!(flag, "nope");
            Ok(())
        }
        assert_eq!(checked(true), Ok(()));
        assert_eq!(checked(false), Err("nope"));
    }
}
