//! IdGenerator port - id minting.
//!
//! Run and environment ids go through this trait; `UlidGenerator` takes the
//! timestamp half of the ULID from a `Clock`, so a `FixedClock` yields ids
//! that differ only in their random half.

use ulid::Ulid;

use crate::domain::ids::{EnvironmentId, RunId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;

    fn generate_environment_id(&self) -> EnvironmentId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        RunId::from(self.next())
    }

    fn generate_environment_id(&self) -> EnvironmentId {
        EnvironmentId::from(self.next())
    }
}
