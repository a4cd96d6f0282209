//! Linux device plumbing: the receiver's serial port and the PPS GPIO line.
//!
//! Both are thin adapters around the core: the serial port becomes an
//! `AsyncRead` for [`IngestLoop`](crate::gps::IngestLoop), and the GPIO
//! thread calls [`EdgeCapture::on_edge`](crate::gps::EdgeCapture::on_edge).

pub mod gpio;
pub mod serial;


pub use gpio::{Debounce, DEFAULT_DEBOUNCE, DEFAULT_GPIO_PIN, Edge, GpioConfig, GpioEdgeSource};
pub use serial::{DEFAULT_BAUD, DEFAULT_DEVICE, SerialDevice, baud_rate};
