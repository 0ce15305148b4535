pub mod backend;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod playback;
pub mod registry;
pub mod source;
pub mod status;
pub mod streamer;
pub mod wav;
mod worker;

#[cfg(test)]
mod test_support;

pub use audio_stream_types::{LoadMode, SoundFormat, SourceStatus, Vec3};
pub use backend::{AudioBackend, SoftwareBackend};
pub use config::{StreamerConfig, SystemConfig};
pub use decode::{ContainerKind, PcmSource, StreamDescriptor, open_source};
pub use error::{BackendError, DecodeError, SoundError};
pub use registry::SoundSystem;
pub use source::SoundSource;
