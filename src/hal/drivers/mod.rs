pub mod http;
pub mod serial;
pub mod stream;

pub use http::HttpTransport;
pub use serial::{SerialOpener, TcpOpener};
pub use stream::{LineFramer, StreamHandle, StreamOpener, StreamTransport};
