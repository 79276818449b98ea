// src/driver.rs

/// The network controller as seen by the engine.
///
/// Only raw frame I/O is required. Filter and power control default to no-ops for
/// controllers that have nothing to configure.
pub trait NetworkDriver {
    /// Copies one pending frame into `buf` and returns its length, or 0 if none is waiting.
    fn receive_frame(&mut self, buf: &mut [u8]) -> usize;

    fn send_frame(&mut self, frame: &[u8]);

    fn link_up(&self) -> bool {
        true
    }

    fn enable_broadcast(&mut self) {}
    fn disable_broadcast(&mut self) {}
    fn enable_multicast(&mut self) {}
    fn disable_multicast(&mut self) {}
    fn power_up(&mut self) {}
    fn power_down(&mut self) {}
}

impl<T: NetworkDriver + ?Sized> NetworkDriver for &mut T {
    fn receive_frame(&mut self, buf: &mut [u8]) -> usize {
        (**self).receive_frame(buf)
    }
    fn send_frame(&mut self, frame: &[u8]) {
        (**self).send_frame(frame)
    }
    fn link_up(&self) -> bool {
        (**self).link_up()
    }
    fn enable_broadcast(&mut self) {
        (**self).enable_broadcast()
    }
    fn disable_broadcast(&mut self) {
        (**self).disable_broadcast()
    }
    fn enable_multicast(&mut self) {
        (**self).enable_multicast()
    }
    fn disable_multicast(&mut self) {
        (**self).disable_multicast()
    }
    fn power_up(&mut self) {
        (**self).power_up()
    }
    fn power_down(&mut self) {
        (**self).power_down()
    }
}

/// Monotonic millisecond time source used for every deadline.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
