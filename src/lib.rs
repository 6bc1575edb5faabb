//! Android screen mirroring over scrcpy: the host side reads the device's
//! raw H.264 stream and relays it as JSON wire messages; the UI side
//! reassembles access units and drives a video decoder.

pub mod assembler;
pub mod batcher;
pub mod clock;
pub mod decoder;
pub mod device;
pub mod mirror;
pub mod nal;
pub mod params;
pub mod relay;
pub mod replay;
pub mod session;
pub mod settings;
pub mod surface;
pub mod system;
pub mod transport;
pub mod wire;
