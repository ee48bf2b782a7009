//! IdGenerator port - operation id allocation.

use crate::domain::OperationId;
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_operation_id(&self) -> OperationId;
}

/// ULID-based generator. The timestamp part comes from the injected clock,
/// so ids generated under a [`FixedClock`](crate::ports::FixedClock) share
/// a deterministic prefix.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_operation_id(&self) -> OperationId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        OperationId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let ids = UlidGenerator::new(SystemClock);
        let a = ids.generate_operation_id();
        let b = ids.generate_operation_id();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("op-"));
    }

    #[test]
    fn timestamp_comes_from_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidGenerator::new(FixedClock::new(fixed_time));

        let id = ids.generate_operation_id();
        let timestamp = (id.as_ulid().0 >> 80) as u64;
        assert_eq!(timestamp, fixed_time.timestamp_millis() as u64);
    }
}
