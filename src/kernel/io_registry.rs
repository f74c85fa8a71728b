use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{lock, Pid};

use crate::error::{KernelError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoRequest {
    pub pid: Pid,
    pub duration_ms: u64,
}

/// A request ready to be sent to a device endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoDispatch {
    pub device: String,
    pub ip: String,
    pub port: u16,
    pub request: IoRequest,
}

#[derive(Debug, Default)]
struct Device {
    endpoint: Option<(String, u16)>,
    current: Option<IoRequest>,
    waiting: VecDeque<IoRequest>,
}

impl Device {
    /// Starts the next waiting request if the device is connected and idle.
    fn start_next(&mut self, name: &str) -> Option<IoDispatch> {
        if self.current.is_some() {
            return None;
        }
        let (ip, port) = self.endpoint.clone()?;
        let request = self.waiting.pop_front()?;
        self.current = Some(request.clone());
        Some(IoDispatch {
            device: name.to_string(),
            ip,
            port,
            request,
        })
    }
}

/// IO devices by name, each with its own FIFO wait queue.
///
/// Devices named in the configuration are known before they connect;
/// requests to them wait until they do.
pub struct IoRegistry {
    devices: Mutex<HashMap<String, Device>>,
}

impl IoRegistry {
    pub fn new(known_devices: &[String]) -> IoRegistry {
        let devices = known_devices
            .iter()
            .map(|name| (name.clone(), Device::default()))
            .collect();
        IoRegistry {
            devices: Mutex::new(devices),
        }
    }

    pub fn register(&self, name: &str, ip: &str, port: u16) -> Option<IoDispatch> {
        let mut devices = lock(&self.devices);
        let device = devices.entry(name.to_string()).or_default();
        device.endpoint = Some((ip.to_string(), port));
        device.start_next(name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        lock(&self.devices).contains_key(name)
    }

    /// Queues a request. Returns the dispatch to send when the device
    /// can start it right away.
    pub fn request(&self, name: &str, pid: Pid, duration_ms: u64) -> Result<Option<IoDispatch>> {
        let mut devices = lock(&self.devices);
        let device = devices
            .get_mut(name)
            .ok_or_else(|| KernelError::UnknownDevice(name.to_string()))?;
        device.waiting.push_back(IoRequest { pid, duration_ms });
        Ok(device.start_next(name))
    }

    /// Marks `pid`'s request on `name` as finished and starts the next one.
    pub fn finish(&self, name: &str, pid: Pid) -> Result<Option<IoDispatch>> {
        let mut devices = lock(&self.devices);
        let device = devices
            .get_mut(name)
            .ok_or_else(|| KernelError::UnknownDevice(name.to_string()))?;
        if device.current.as_ref().is_some_and(|current| current.pid == pid) {
            device.current = None;
        } else {
            device.waiting.retain(|request| request.pid != pid);
        }
        Ok(device.start_next(name))
    }

    /// Drops a device, returning every process that was using or waiting on it.
    pub fn unregister(&self, name: &str) -> Vec<Pid> {
        let mut devices = lock(&self.devices);
        match devices.remove(name) {
            Some(device) => device
                .current
                .into_iter()
                .chain(device.waiting)
                .map(|request| request.pid)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Forgets every request by `pid`, returning dispatches freed up by it.
    pub fn cancel(&self, pid: Pid) -> Vec<IoDispatch> {
        let mut devices = lock(&self.devices);
        let mut started = Vec::new();
        for (name, device) in devices.iter_mut() {
            device.waiting.retain(|request| request.pid != pid);
            if device.current.as_ref().is_some_and(|current| current.pid == pid) {
                device.current = None;
                started.extend(device.start_next(name));
            }
        }
        started
    }

    #[cfg(test)]
    pub fn waiting(&self, name: &str) -> Vec<Pid> {
        lock(&self.devices)
            .get(name)
            .map(|device| device.waiting.iter().map(|request| request.pid).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> IoRegistry {
        let registry = IoRegistry::new(&["DISCO".to_string()]);
        registry.register("DISCO", "127.0.0.1", 8003);
        registry
    }

    #[test]
    fn test_io_registry_busy_device_queues() {
        let registry = registry();
        let first = registry.request("DISCO", 1, 100).unwrap().unwrap();
        assert_eq!(first.request, IoRequest { pid: 1, duration_ms: 100 });
        assert_eq!(first.port, 8003);

        assert_eq!(registry.request("DISCO", 2, 50).unwrap(), None);
        assert_eq!(registry.request("DISCO", 3, 10).unwrap(), None);
        assert_eq!(registry.waiting("DISCO"), vec![2, 3]);

        let next = registry.finish("DISCO", 1).unwrap().unwrap();
        assert_eq!(next.request.pid, 2);
        assert_eq!(registry.waiting("DISCO"), vec![3]);
    }

    #[test]
    fn test_io_registry_unknown_device() {
        let registry = registry();
        let result = registry.request("TECLADO", 1, 100);
        assert!(matches!(result, Err(KernelError::UnknownDevice(name)) if name == "TECLADO"));
    }

    #[test]
    fn test_io_registry_known_device_waits_for_connection() {
        let registry = IoRegistry::new(&["DISCO".to_string()]);
        assert_eq!(registry.request("DISCO", 4, 10).unwrap(), None);

        let started = registry.register("DISCO", "127.0.0.1", 8003).unwrap();
        assert_eq!(started.request.pid, 4);
    }

    #[test]
    fn test_io_registry_unregister_returns_affected() {
        let registry = registry();
        registry.request("DISCO", 1, 100).unwrap();
        registry.request("DISCO", 2, 100).unwrap();

        assert_eq!(registry.unregister("DISCO"), vec![1, 2]);
        assert!(registry.request("DISCO", 3, 1).is_err());
    }

    #[test]
    fn test_io_registry_cancel_starts_next() {
        let registry = registry();
        registry.request("DISCO", 1, 100).unwrap();
        registry.request("DISCO", 2, 100).unwrap();

        let started = registry.cancel(1);
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].request.pid, 2);
    }
}
