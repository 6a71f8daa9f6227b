mod buzz_controller;
mod buzz_state;
mod transport;

#[allow(unused_imports)]
pub use buzz_controller::{
    ButtonEvent, BuzzController, BuzzError, BuzzLights, EventCallback, LIGHT_OFF, LIGHT_ON,
};
#[allow(unused_imports)]
pub use buzz_state::{Button, BuzzState, PadButtons};
#[allow(unused_imports)]
pub use transport::{BuzzTransport, UsbTransport, LIGHT_PAYLOAD_LEN, PRODUCT_ID, VENDOR_ID};

#[cfg(test)]
pub(crate) use transport::mock::MockTransport;
