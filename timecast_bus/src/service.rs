use crate::{Bus, BusError, ServiceStatus};
use std::sync::Arc;
use timecast_proto::{Arg, Message, TypeString};

/// A locally provided service, and the methods implemented under it.
///
/// Several `Service`s may provide the same service name (e.g. one per audio
/// channel), the bus keeps the service alive until the last of them is
/// dropped.
///
/// Dropping a `Service` unbinds every method it implemented, so handlers never
/// outlive their owner's registration.
pub struct Service<B: Bus> {
    bus: Arc<B>,
    name: Box<str>,
    methods: Vec<String>,
}

impl<B: Bus> Service<B> {
    /// Provides `name` on the bus.
    pub fn provide(bus: Arc<B>, name: &str) -> Result<Self, BusError> {
        if name.is_empty() || name.contains('/') {
            return Err(BusError::InvalidPath(name.into()));
        }

        bus.acquire_service(name)?;

        Ok(Self {
            bus,
            name: name.into(),
            methods: Vec::new(),
        })
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Returns the full paths of the methods implemented so far.
    #[inline(always)]
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(String::as_str)
    }

    /// Implements the method at `path` (relative to the service) with `handler`.
    ///
    /// `typestring` declares the accepted arguments, see
    /// [`TypeString`](timecast_proto::TypeString).
    pub fn implement(
        &mut self,
        path: &str,
        typestring: &str,
        handler: impl Fn(&Message<'_>) + Send + Sync + 'static,
    ) -> Result<(), BusError> {
        let typestring = TypeString::parse(typestring)?;
        let full_path = crate::join_path(&self.name, path)?;

        self.bus
            .add_method(&full_path, typestring, Arc::new(handler))?;

        log::debug!("implemented {full_path}");
        self.methods.push(full_path);
        Ok(())
    }
}

impl<B: Bus> Drop for Service<B> {
    fn drop(&mut self) {
        for path in self.methods.drain(..) {
            self.bus.remove_method(&path);
        }

        self.bus.release_service(&self.name);
    }
}

impl<B: Bus> core::fmt::Debug for Service<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Sends typed messages to the methods found under an address.
///
/// The address is made of a service name and, optionally, a path below it
/// (e.g. `"mixer/0"`).
pub struct Client<B: Bus> {
    bus: Arc<B>,
    address: Box<str>,
}

impl<B: Bus> Client<B> {
    pub fn new(bus: Arc<B>, address: &str) -> Result<Self, BusError> {
        if !timecast_proto::is_valid_address(address) {
            return Err(BusError::InvalidPath(address.into()));
        }

        Ok(Self {
            bus,
            address: address.into(),
        })
    }

    #[inline(always)]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the name of the addressed service.
    #[inline(always)]
    pub fn service(&self) -> &str {
        let address: &str = &self.address;
        address.split_once('/').map_or(address, |(service, _)| service)
    }

    #[inline(always)]
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Returns the status of the addressed service.
    #[inline(always)]
    pub fn status(&self) -> ServiceStatus {
        self.bus.status(self.service())
    }

    /// Sends `args` to `method`, below this client's address, to be delivered
    /// at `timestamp` (`0.0` for "now").
    #[inline]
    pub fn send(&self, timestamp: f64, method: &str, args: Vec<Arg<'_>>) -> Result<(), BusError> {
        let path = crate::join_path(&self.address, method)?;
        self.bus.send(&Message::new(timestamp, path, args))
    }
}

impl<B: Bus> core::fmt::Debug for Client<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.address)
            .finish()
    }
}
