//! Orchestrator-side proxy for a running component.

use crux_protocol::{names, Descriptor, Envelope, Payload, PayloadMap};
use tracing::debug;

use crate::component::error::HandleError;
use crate::transport::{Address, ChannelOptions, ManagedSocket};

/// A connection to one component, with its descriptor already fetched.
pub struct ComponentHandle {
    socket: ManagedSocket,
    descriptor: Descriptor,
    options: ChannelOptions,
}

impl ComponentHandle {
    /// Connect to the component at `address` and fetch its descriptor.
    ///
    /// Waits up to the connect timeout for a freshly launched component to
    /// start listening.
    pub async fn connect(address: Address, options: ChannelOptions) -> Result<Self, HandleError> {
        let mut socket = ManagedSocket::new(address).with_connect_timeout(options.connect_timeout);

        let reply = socket
            .call(&Envelope::new(names::GET_DESCRIPTOR), options.request_timeout)
            .await?;
        let descriptor_err = |reason: String| HandleError::Descriptor {
            address: socket.address().clone(),
            reason,
        };

        if !reply.success {
            return Err(descriptor_err(
                reply.message().unwrap_or("request refused").to_string(),
            ));
        }
        let payload = reply
            .payload
            .as_ref()
            .ok_or_else(|| descriptor_err("empty reply".to_string()))?;
        let descriptor = Descriptor::from_payload(payload).map_err(|e| descriptor_err(e.to_string()))?;

        debug!(
            component = %descriptor.name,
            version = %descriptor.version,
            address = %socket.address(),
            "Fetched descriptor"
        );

        Ok(Self {
            socket,
            descriptor,
            options,
        })
    }

    pub fn address(&self) -> &Address {
        self.socket.address()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    /// Send a raw request and return the raw reply.
    pub async fn request(&mut self, envelope: &Envelope) -> Result<Envelope, HandleError> {
        Ok(self.socket.call(envelope, self.options.request_timeout).await?)
    }

    /// Run the component once.
    ///
    /// The reply is returned as-is; a `success == false` reply is not an
    /// error at this level.
    pub async fn execute(&mut self, parameters: PayloadMap, inputs: Payload) -> Result<Envelope, HandleError> {
        let mut body = PayloadMap::new();
        body.insert("parameters".to_string(), Payload::Mapping(parameters));
        body.insert("inputs".to_string(), inputs);

        self.request(&Envelope::new(names::EXECUTE).with_payload(body))
            .await
    }

    /// Ask the component to exit its request loop.
    pub async fn shutdown(&mut self) -> Result<Envelope, HandleError> {
        self.request(&Envelope::new(names::SHUTDOWN)).await
    }
}

impl std::fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("address", self.socket.address())
            .field("name", &self.descriptor.name)
            .field("version", &self.descriptor.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::worker::Worker;
    use std::time::Duration;

    fn descriptor() -> Descriptor {
        Descriptor {
            name: "echo".to_string(),
            version: "2.1.0".to_string(),
            startup: "true".to_string(),
            inputs: Default::default(),
            outputs: Default::default(),
            parameters: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_connect_fetches_descriptor_and_executes() {
        let dir = tempfile::tempdir().unwrap();
        let address = Address::ipc(dir.path().join("echo"));

        // Connect first: the handle retries until the worker is listening.
        let bind = address.clone();
        let worker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut worker = Worker::bind(descriptor(), Some(bind)).await.unwrap();
            while let Some(execution) = worker.wait().await.unwrap() {
                assert!(execution.inputs.is_empty());
                worker.output(PayloadMap::new()).unwrap();
            }
        });

        let mut handle = ComponentHandle::connect(address, ChannelOptions::default())
            .await
            .unwrap();
        assert_eq!(handle.name(), "echo");
        assert_eq!(handle.version(), "2.1.0");

        let reply = handle
            .execute(PayloadMap::new(), Payload::empty_mapping())
            .await
            .unwrap();
        assert!(reply.success);

        let ack = handle.shutdown().await.unwrap();
        assert_eq!(ack.name, names::ACK);
        worker.await.unwrap();
    }
}
