pub mod coordinator;
pub mod dispatcher;
pub mod hash;
pub mod queue;
pub mod registry;
pub mod transaction;
pub mod watchdog;

pub use coordinator::{Coordinator, CoordinatorStatus, ResolutionPolicy};

#[cfg(test)]
pub(crate) mod testing {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use anyhow::{bail, Result};
    use tokio::sync::broadcast;
    use shared::types::{Notification, ServiceRecord};
    use crate::platform::{Facility, ScanRequest};
    use super::{Coordinator, ResolutionPolicy};

    /// Facility double that records every request it receives.
    #[derive(Default)]
    pub struct RecordingFacility {
        scans: Mutex<Vec<ScanRequest>>,
        stops: Mutex<usize>,
        resolves: Mutex<Vec<(u64, String)>>,
        fail_scan: AtomicBool,
        fail_resolve: AtomicBool,
    }

    impl RecordingFacility {
        pub fn scans(&self) -> Vec<ScanRequest> {
            self.scans.lock().unwrap().clone()
        }

        pub fn stops(&self) -> usize {
            *self.stops.lock().unwrap()
        }

        pub fn resolves(&self) -> Vec<String> {
            self.resolves.lock().unwrap().iter().map(|(_, name)| name.clone()).collect()
        }

        /// Transaction id of the most recent resolve request
        pub fn last_resolve_id(&self) -> Option<u64> {
            self.resolves.lock().unwrap().last().map(|(id, _)| *id)
        }

        pub fn fail_scan(&self, fail: bool) {
            self.fail_scan.store(fail, Ordering::SeqCst);
        }

        pub fn fail_resolve(&self, fail: bool) {
            self.fail_resolve.store(fail, Ordering::SeqCst);
        }
    }

    impl Facility for RecordingFacility {
        fn scan(&self, request: &ScanRequest) -> Result<()> {
            if self.fail_scan.load(Ordering::SeqCst) {
                bail!("browse refused");
            }
            self.scans.lock().unwrap().push(request.clone());
            Ok(())
        }

        fn stop_scan(&self) -> Result<()> {
            *self.stops.lock().unwrap() += 1;
            Ok(())
        }

        fn resolve(&self, id: u64, name: &str) -> Result<()> {
            self.resolves.lock().unwrap().push((id, name.to_string()));
            if self.fail_resolve.load(Ordering::SeqCst) {
                bail!("resolver unavailable");
            }
            Ok(())
        }
    }

    pub fn coordinator(
        policy: ResolutionPolicy,
    ) -> (Coordinator, Arc<RecordingFacility>, broadcast::Receiver<Notification>) {
        let facility = Arc::new(RecordingFacility::default());
        let (tx, rx) = broadcast::channel(64);
        let coordinator = Coordinator::new(facility.clone(), tx, policy);
        (coordinator, facility, rx)
    }

    pub fn record(name: &str) -> ServiceRecord {
        ServiceRecord::named(name, "_http._tcp.local.")
    }

    pub fn resolved_record(name: &str) -> ServiceRecord {
        let mut record = record(name);
        record.hostname = Some(format!("{}.local.", name));
        record.addresses = vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))];
        record.port = Some(8080);
        record
    }

    pub fn names(records: &[ServiceRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            out.push(notification);
        }
        out
    }
}
