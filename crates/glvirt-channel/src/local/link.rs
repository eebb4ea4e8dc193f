use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};
use glvirt_core::{ChannelError, DeviceDescription, Envelope};
use tracing::{debug, error, trace};

use crate::bridge::BufferSink;

/// Create a connected producer/consumer pair.
pub fn connect() -> (ProducerEnd, ConsumerEnd) {
    let (envelope_tx, envelope_rx) = unbounded();
    let (description_tx, description_rx) = bounded(1);
    (
        ProducerEnd {
            envelopes: envelope_tx,
            description: description_rx,
            connected: AtomicBool::new(true),
        },
        ConsumerEnd {
            envelopes: envelope_rx,
            description: description_tx,
        },
    )
}

/// Producer side: submits envelopes, receives the device description.
#[derive(Debug)]
pub struct ProducerEnd {
    envelopes: Sender<Envelope>,
    description: Receiver<DeviceDescription>,
    connected: AtomicBool,
}

impl ProducerEnd {
    /// Block until the consumer announces its device. `None` waits forever.
    pub fn wait_for_description(
        &self,
        timeout: Option<Duration>,
    ) -> Result<DeviceDescription, ChannelError> {
        let received = match timeout {
            None => self.description.recv().map_err(|_| {
                ChannelError::Handshake("consumer closed before describing its device".into())
            }),
            Some(timeout) => self
                .description
                .recv_timeout(timeout)
                .map_err(|e| match e {
                    RecvTimeoutError::Timeout => {
                        ChannelError::Handshake(format!("no device description within {timeout:?}"))
                    }
                    RecvTimeoutError::Disconnected => ChannelError::Handshake(
                        "consumer closed before describing its device".into(),
                    ),
                }),
        };
        match &received {
            Ok(desc) => debug!(version = %desc.version, "received device description"),
            Err(e) => error!("{e}"),
        }
        received
    }
}

impl BufferSink for ProducerEnd {
    fn submit(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let buffer_id = envelope.message.buffer_id;
        let commands = envelope.message.commands.len();
        match self.envelopes.send(envelope) {
            Ok(()) => {
                trace!(buffer_id, commands, "submitted");
                Ok(())
            }
            Err(_) => {
                self.connected.store(false, Ordering::Relaxed);
                error!(buffer_id, "consumer end dropped, buffer lost");
                Err(ChannelError::Disconnected)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Consumer side: announces the device, receives envelopes in order.
#[derive(Debug)]
pub struct ConsumerEnd {
    envelopes: Receiver<Envelope>,
    description: Sender<DeviceDescription>,
}

impl ConsumerEnd {
    /// Send the device description. Only the first announcement is accepted.
    pub fn announce(&self, desc: DeviceDescription) -> Result<(), ChannelError> {
        match self.description.try_send(desc) {
            Ok(()) => {
                debug!("announced device description");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                error!("device description announced twice");
                Err(ChannelError::Handshake("device already described".into()))
            }
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::Disconnected),
        }
    }

    /// Block for the next envelope. `None` once every producer is gone and
    /// the queue is drained.
    pub fn recv(&self) -> Option<Envelope> {
        self.envelopes.recv().ok()
    }

    /// `Ok(None)` when nothing arrived within `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Envelope>, ChannelError> {
        match self.envelopes.recv_timeout(timeout) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }

    /// `Ok(None)` when the queue is currently empty.
    pub fn try_recv(&self) -> Result<Option<Envelope>, ChannelError> {
        match self.envelopes.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }

    /// Every envelope already queued, without blocking.
    pub fn drain(&self) -> impl Iterator<Item = Envelope> + '_ {
        self.envelopes.try_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glvirt_core::{CommandBuffer, Op};
    use std::thread;

    fn envelope(id: u64, is_rendering: bool) -> Envelope {
        let mut buffer = CommandBuffer::new(id, is_rendering);
        buffer.add_message(Op::Flush, vec![]);
        Envelope::from_buffer(0, &mut buffer)
    }

    #[test]
    fn envelopes_arrive_in_submission_order() {
        let (producer, consumer) = connect();
        for id in 0..5 {
            producer.submit(envelope(id, id % 2 == 0)).unwrap();
        }
        let ids: Vec<u64> = consumer.drain().map(|e| e.message.buffer_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(consumer.try_recv().unwrap().is_none());
    }

    #[test]
    fn submit_fails_once_consumer_is_dropped() {
        let (producer, consumer) = connect();
        drop(consumer);
        assert_eq!(
            producer.submit(envelope(0, false)),
            Err(ChannelError::Disconnected)
        );
        assert!(!producer.is_connected());
    }

    #[test]
    fn handshake_times_out_without_announcement() {
        let (producer, _consumer) = connect();
        let err = producer
            .wait_for_description(Some(Duration::from_millis(5)))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Handshake(_)));
    }

    #[test]
    fn recv_reports_disconnect_after_drain() {
        let (producer, consumer) = connect();
        producer.submit(envelope(9, true)).unwrap();
        drop(producer);
        assert_eq!(consumer.recv().map(|e| e.message.buffer_id), Some(9));
        assert!(consumer.recv().is_none());
        assert_eq!(
            consumer.recv_timeout(Duration::from_millis(1)).unwrap_err(),
            ChannelError::Disconnected
        );
    }

    #[test]
    fn producer_blocks_until_consumer_thread_announces() {
        let (producer, consumer) = connect();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            consumer.announce(test_description()).unwrap();
            consumer
        });
        let desc = producer.wait_for_description(None).unwrap();
        assert_eq!(desc.drawable, (8, 8));
        handle.join().unwrap();
    }

    #[test]
    fn second_announcement_is_refused() {
        let (_producer, consumer) = connect();
        consumer.announce(test_description()).unwrap();
        assert!(matches!(
            consumer.announce(test_description()),
            Err(ChannelError::Handshake(_))
        ));
    }

    fn test_description() -> DeviceDescription {
        DeviceDescription {
            version: "3.3".into(),
            api_version: (3, 3),
            vendor: "test".into(),
            renderer: "test".into(),
            shading_language_versions: vec!["330".into()],
            extensions: Default::default(),
            limits: Default::default(),
            precisions: Vec::new(),
            drawable: (8, 8),
        }
    }
}
