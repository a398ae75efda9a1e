//! Kernel state flushing through the system utilities.

use tokio::process::Command;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, NatResult};

/// Trait for flushing the kernel state owned by the NAT manager.
///
/// Each operation removes one class of kernel state: translation rules,
/// packet marking rules, or tracked connections. The operations are
/// independent of each other and are expected to be idempotent, since
/// flushing state that is already gone is a no-op for the underlying
/// utilities.
#[async_trait::async_trait]
pub trait SystemFlush: Send + Sync {
    /// Removes all rules from the translation table.
    async fn flush_nat_rules(&self) -> NatResult<()>;

    /// Removes all rules from the packet marking table.
    async fn flush_mangle_rules(&self) -> NatResult<()>;

    /// Drops all tracked connection entries.
    async fn flush_conntrack(&self) -> NatResult<()>;
}

/// Flusher that shells out to the system utilities.
#[derive(Debug, Default)]
pub struct SystemStateFlusher;

impl SystemStateFlusher {
    /// Runs one external command and fails on a non-zero exit status.
    async fn run_command(program: &str, args: &[&str]) -> NatResult<()> {
        let rendered = format!("{program} {}", args.join(" "));
        debug!(command = %rendered, "running system command");

        let output = Command::new(program).args(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            bail!(
                ErrorKind::CommandFailed,
                "Command exited with a failure status",
                format!("{rendered}: {}", stderr.trim())
            );
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl SystemFlush for SystemStateFlusher {
    async fn flush_nat_rules(&self) -> NatResult<()> {
        Self::run_command("iptables", &["-t", "nat", "-F"]).await
    }

    async fn flush_mangle_rules(&self) -> NatResult<()> {
        Self::run_command("iptables", &["-t", "mangle", "-F"]).await
    }

    async fn flush_conntrack(&self) -> NatResult<()> {
        Self::run_command("conntrack", &["-F"]).await
    }
}
