//! The link layer seam: sending and capturing raw Ethernet frames.

use std::collections::HashMap;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::sync::{
    Arc,
    RwLock,
};
use std::thread::{
    self,
    JoinHandle,
};
use std::time::{
    Duration,
    Instant,
};

use crate::core::repr::{
    EthernetAddress,
    EthernetFrame,
};
use crate::{
    Error,
    Result,
};

/// A low level interface for sending and receiving frames across a link.
pub trait Link: Send + Sync {
    /// Wraps the payload in an Ethernet header with the link's address as
    /// the source and sends it.
    fn send_frame(&self, payload: &[u8], eth_type: u16, dst_addr: EthernetAddress) -> Result<()>;

    /// Reads a whole Ethernet frame into the buffer and returns its size.
    ///
    /// Implementations may block for a short poll interval, returning
    /// `Error::Exhausted` if no frame arrived in that time.
    fn recv_frame(&self, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the hardware address associated with the link.
    fn ethernet_addr(&self) -> EthernetAddress;
}

/// Capture metadata delivered alongside each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMeta {
    /// Number of bytes captured.
    pub capture_len: usize,
    /// Number of bytes of the frame on the wire.
    pub original_len: usize,
    /// When the frame was captured.
    pub timestamp: Instant,
}

/// A consumer of frames with a particular Ethernet payload type.
pub trait FrameHandler: Send + Sync {
    /// Processes the payload of a frame, with the Ethernet header stripped.
    fn recv_frame(&self, meta: &FrameMeta, payload: &[u8], src_addr: EthernetAddress);
}

/// Routes captured frames to handlers by Ethernet payload type.
pub struct Dispatcher {
    eth_addr: EthernetAddress,
    handlers: RwLock<HashMap<u16, Arc<dyn FrameHandler>>>,
}

impl Dispatcher {
    /// Creates a dispatcher for frames sent to eth_addr or broadcast.
    pub fn new(eth_addr: EthernetAddress) -> Dispatcher {
        Dispatcher {
            eth_addr,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the handler for a payload type, replacing any previous one.
    pub fn register(&self, eth_type: u16, handler: Arc<dyn FrameHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|err| err.into_inner());
        if handlers.insert(eth_type, handler).is_some() {
            debug!("Replaced frame handler for type 0x{:04X}.", eth_type);
        }
    }

    /// Parses a frame and passes its payload to the registered handler.
    ///
    /// Frames are dispatched whole as they are read from a link, so the
    /// captured and original lengths are the same.
    pub fn dispatch(&self, frame: &[u8]) -> Result<()> {
        let meta = FrameMeta {
            capture_len: frame.len(),
            original_len: frame.len(),
            timestamp: Instant::now(),
        };
        self.dispatch_with_meta(&meta, frame)
    }

    fn dispatch_with_meta(&self, meta: &FrameMeta, frame: &[u8]) -> Result<()> {
        let eth_frame = EthernetFrame::try_new(frame)?;

        if eth_frame.src_addr() == self.eth_addr {
            return Err(Error::Ignored);
        }

        if eth_frame.dst_addr() != self.eth_addr && !eth_frame.dst_addr().is_broadcast() {
            debug!(
                "Ignoring ethernet frame with destination {}.",
                eth_frame.dst_addr()
            );
            return Err(Error::Ignored);
        }

        let handler = {
            let handlers = self.handlers.read().unwrap_or_else(|err| err.into_inner());
            handlers.get(&eth_frame.payload_type()).cloned()
        };

        match handler {
            Some(handler) => {
                handler.recv_frame(meta, eth_frame.payload(), eth_frame.src_addr());
                Ok(())
            }
            None => {
                debug!(
                    "Ignoring ethernet frame with type 0x{:04X}.",
                    eth_frame.payload_type()
                );
                Err(Error::Ignored)
            }
        }
    }
}

/// A dedicated thread reading frames from a link and dispatching them.
///
/// All inbound processing for a link is serialized on this thread. The thread
/// is stopped and joined when the capture is dropped.
pub struct Capture {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Capture {
    /// Starts capturing frames from the link.
    pub fn spawn(link: Arc<dyn Link>, dispatcher: Arc<Dispatcher>) -> Result<Capture> {
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = running.clone();
            thread::Builder::new()
                .name("usrip-capture".into())
                .spawn(move || capture(&*link, &dispatcher, &running))?
        };

        Ok(Capture {
            running,
            thread: Some(thread),
        })
    }

    /// Stops the capture thread and waits for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked.");
            }
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture(link: &dyn Link, dispatcher: &Dispatcher, running: &AtomicBool) {
    let mut buffer = vec![0; EthernetFrame::<&[u8]>::MAX_FRAME_LEN];

    while running.load(Ordering::SeqCst) {
        match link.recv_frame(&mut buffer) {
            Ok(buffer_len) => match dispatcher.dispatch(&buffer[.. buffer_len]) {
                Ok(_) | Err(Error::Ignored) => {}
                Err(err) => debug!("Error dispatching ethernet frame with {:?}.", err),
            },
            Err(Error::Exhausted) => continue,
            Err(err) => {
                warn!("Error receiving ethernet frame with {:?}.", err);
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::repr::eth_types;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(Vec<u8>, EthernetAddress)>>,
    }

    impl FrameHandler for Recorder {
        fn recv_frame(&self, _: &FrameMeta, payload: &[u8], src_addr: EthernetAddress) {
            self.frames.lock().unwrap().push((payload.to_vec(), src_addr));
        }
    }

    fn frame(dst_addr: EthernetAddress, src_addr: EthernetAddress, eth_type: u16) -> Vec<u8> {
        let mut buffer = vec![0; EthernetFrame::<&[u8]>::buffer_len(4)];
        {
            let mut eth_frame = EthernetFrame::try_new(&mut buffer[..]).unwrap();
            eth_frame.set_dst_addr(dst_addr);
            eth_frame.set_src_addr(src_addr);
            eth_frame.set_payload_type(eth_type);
            eth_frame.payload_mut().copy_from_slice(&[1, 2, 3, 4]);
        }
        buffer
    }

    fn local() -> EthernetAddress {
        EthernetAddress::new([0x06, 0, 0, 0, 0, 1])
    }

    fn remote() -> EthernetAddress {
        EthernetAddress::new([0x06, 0, 0, 0, 0, 2])
    }

    #[test]
    fn test_dispatch_by_type() {
        let dispatcher = Dispatcher::new(local());
        let arp = Arc::new(Recorder::default());
        dispatcher.register(eth_types::ARP, arp.clone());

        assert_matches!(
            dispatcher.dispatch(&frame(local(), remote(), eth_types::ARP)),
            Ok(())
        );
        assert_matches!(
            dispatcher.dispatch(&frame(EthernetAddress::BROADCAST, remote(), eth_types::ARP)),
            Ok(())
        );
        assert_matches!(
            dispatcher.dispatch(&frame(local(), remote(), eth_types::IPV4)),
            Err(Error::Ignored)
        );

        let frames = arp.frames.lock().unwrap();
        assert_eq!(2, frames.len());
        assert_eq!((vec![1, 2, 3, 4], remote()), frames[0]);
    }

    #[test]
    fn test_dispatch_ignores_other_destinations_and_own_frames() {
        let dispatcher = Dispatcher::new(local());
        let arp = Arc::new(Recorder::default());
        dispatcher.register(eth_types::ARP, arp.clone());

        let other = EthernetAddress::new([0x06, 0, 0, 0, 0, 3]);
        assert_matches!(
            dispatcher.dispatch(&frame(other, remote(), eth_types::ARP)),
            Err(Error::Ignored)
        );
        assert_matches!(
            dispatcher.dispatch(&frame(EthernetAddress::BROADCAST, local(), eth_types::ARP)),
            Err(Error::Ignored)
        );
        assert!(arp.frames.lock().unwrap().is_empty());
    }

    #[derive(Default)]
    struct MetaRecorder {
        metas: Mutex<Vec<FrameMeta>>,
    }

    impl FrameHandler for MetaRecorder {
        fn recv_frame(&self, meta: &FrameMeta, _: &[u8], _: EthernetAddress) {
            self.metas.lock().unwrap().push(*meta);
        }
    }

    #[test]
    fn test_dispatch_meta_describes_whole_frame() {
        let dispatcher = Dispatcher::new(local());
        let recorder = Arc::new(MetaRecorder::default());
        dispatcher.register(eth_types::ARP, recorder.clone());

        let before = Instant::now();
        let bytes = frame(local(), remote(), eth_types::ARP);
        dispatcher.dispatch(&bytes).unwrap();

        let metas = recorder.metas.lock().unwrap();
        assert_eq!(1, metas.len());
        assert_eq!(bytes.len(), metas[0].capture_len);
        assert_eq!(bytes.len(), metas[0].original_len);
        assert!(metas[0].timestamp >= before);
    }

    #[test]
    fn test_last_registration_wins() {
        let dispatcher = Dispatcher::new(local());
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        dispatcher.register(eth_types::IPV4, first.clone());
        dispatcher.register(eth_types::IPV4, second.clone());

        dispatcher
            .dispatch(&frame(local(), remote(), eth_types::IPV4))
            .unwrap();

        assert!(first.frames.lock().unwrap().is_empty());
        assert_eq!(1, second.frames.lock().unwrap().len());
    }
}
