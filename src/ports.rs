//! Host port selection for new containers

use crate::config::PortAllocation;
use crate::db::Database;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// First port handed out by sequential allocation
pub const FIRST_PORT: u16 = 49153;

/// Chooses host ports. In sequential mode, ports handed out but not yet
/// persisted are held in an in-process reservation set.
pub struct PortAllocator {
    mode: PortAllocation,
    db: Database,
    reserved: Mutex<HashMap<String, BTreeSet<u16>>>,
}

impl PortAllocator {
    pub fn new(mode: PortAllocation, db: Database) -> Self {
        Self {
            mode,
            db,
            reserved: Mutex::new(HashMap::new()),
        }
    }

    /// Port for a new container on `host`; `None` lets the daemon choose
    pub fn allocate(&self, host: &str) -> Result<Option<u16>> {
        if self.mode == PortAllocation::Runtime {
            return Ok(None);
        }

        let mut reserved = self.reserved.lock();
        let stored: BTreeSet<u16> = self
            .db
            .find_instances_by_host(host)?
            .iter()
            .flat_map(|i| i.ports_on(host).collect::<Vec<_>>())
            .collect();

        let pending = reserved.entry(host.to_string()).or_default();
        // Persisted ports no longer need a reservation
        pending.retain(|p| !stored.contains(p));

        let port = match stored.iter().chain(pending.iter()).max() {
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| Error::Other(format!("no free port on host {}", host)))?,
            None => FIRST_PORT,
        };
        pending.insert(port);

        tracing::debug!(host, port, "Allocated host port");
        Ok(Some(port))
    }

    /// Drop a reservation whose container never came up
    pub fn release(&self, host: &str, port: u16) {
        let mut reserved = self.reserved.lock();
        if let Some(pending) = reserved.get_mut(host) {
            pending.remove(&port);
        }
    }

    #[cfg(test)]
    fn reserved_on(&self, host: &str) -> Vec<u16> {
        self.reserved
            .lock()
            .get(host)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }
}
