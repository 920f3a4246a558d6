//! Program account capacity reconciliation.

use std::sync::Arc;

use crate::error::ExtendError;
use crate::gateway::{AccountId, ChainGateway};

/// Ensures a program account can hold an artifact before activation is
/// attempted.
pub struct SizeReconciler<G> {
    gateway: Arc<G>,
    min_increment: u64,
}

impl<G: ChainGateway> SizeReconciler<G> {
    pub fn new(gateway: Arc<G>, min_increment: u64) -> Self {
        Self {
            gateway,
            min_increment,
        }
    }

    /// Make sure `program` has at least `required` bytes of capacity,
    /// extending it when undersized. Idempotent: a second call for the same
    /// requirement performs no further extension.
    pub async fn ensure_capacity(
        &self,
        program: &AccountId,
        required: u64,
    ) -> Result<(), ExtendError> {
        let info = self
            .gateway
            .get_account_info(program)
            .await
            .map_err(ExtendError::Query)?;

        if !info.exists {
            // This pipeline never creates program accounts; a missing one
            // is created by the cluster at activation, already sized to the
            // buffer.
            tracing::debug!(program = %program, "Program account does not exist yet, skipping size check");
            return Ok(());
        }

        let Some(extra) = extend_amount(info.capacity, required, self.min_increment) else {
            tracing::debug!(
                program = %program,
                capacity = info.capacity,
                required,
                "Capacity sufficient, no extension needed"
            );
            return Ok(());
        };

        tracing::info!(
            program = %program,
            capacity = info.capacity,
            required,
            extra,
            "Extending program account..."
        );

        self.gateway
            .extend_program(program, extra)
            .await
            .map_err(ExtendError::Extend)?;

        // A reported success is provisional: re-query and refuse to proceed
        // on a capacity that still falls short.
        let after = self
            .gateway
            .get_account_info(program)
            .await
            .map_err(ExtendError::Query)?;

        if after.capacity < required {
            return Err(ExtendError::NotApplied {
                required,
                capacity: after.capacity,
            });
        }

        tracing::info!(program = %program, capacity = after.capacity, "Program account extended");
        Ok(())
    }
}

/// How many bytes to extend by, or `None` when capacity already suffices.
/// The deficit is rounded up to `min_increment` to amortize future growth.
fn extend_amount(capacity: u64, required: u64, min_increment: u64) -> Option<u64> {
    if capacity >= required {
        None
    } else {
        Some((required - capacity).max(min_increment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_extension_when_capacity_sufficient() {
        assert_eq!(extend_amount(20_000, 20_000, 1024), None);
        assert_eq!(extend_amount(30_000, 20_000, 1024), None);
    }

    #[test]
    fn test_extension_covers_deficit() {
        assert_eq!(extend_amount(10_000, 20_000, 1024), Some(10_000));
    }

    #[test]
    fn test_small_deficit_rounds_up_to_min_increment() {
        assert_eq!(extend_amount(19_900, 20_000, 1024), Some(1024));
    }

    #[test]
    fn test_zero_capacity() {
        assert_eq!(extend_amount(0, 5_000, 1024), Some(5_000));
    }
}
