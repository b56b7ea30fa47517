//! Socket and buffered message stream.
mod io;
mod socket;
mod stream;

pub use socket::Socket;
pub use stream::NzStream;
