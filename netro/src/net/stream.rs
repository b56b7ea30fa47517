use bytes::BytesMut;
use std::io;

use super::{Socket, io::poll_write_all};
use crate::{
    Result,
    common::verbose,
    netezza::{BackendMessage, BackendProtocol, FrontendProtocol, ProtocolError, backend, frontend},
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffered connection to netezza.
#[derive(Debug)]
pub struct NzStream {
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl NzStream {
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let socket = Socket::connect_tcp(host, port).await?;
        Ok(Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        })
    }

    /// Buffer a frontend message, call [`flush`][NzStream::flush] to actually send it.
    pub fn send<F: FrontendProtocol>(&mut self, msg: F) {
        frontend::write(msg, &mut self.write_buf);
    }

    /// Buffer for messages outside the regular framing, e.g. handshake packets.
    pub fn write_buf(&mut self) -> &mut BytesMut {
        &mut self.write_buf
    }

    /// Write all buffered messages to the socket.
    pub async fn flush(&mut self) -> io::Result<()> {
        let Self { socket, write_buf, .. } = self;
        std::future::poll_fn(|cx| poll_write_all(socket, write_buf, cx)).await
    }

    /// Receive one framed backend message.
    pub async fn recv(&mut self) -> Result<BackendMessage> {
        let (msgtype, body) = self.decode(backend::decode_frame).await?;
        let msg = BackendMessage::decode(msgtype, body)?;
        verbose!("(B) {msg:?}");
        Ok(msg)
    }

    /// Read from socket until `decoder` yield a value.
    ///
    /// `decoder` must leave the buffer untouched when it returns `Ok(None)`.
    pub fn decode<D, T>(&mut self, decoder: D) -> Decode<'_, D>
    where
        D: FnMut(&mut BytesMut) -> Result<Option<T>, ProtocolError>,
    {
        Decode { stream: self, decoder }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        let socket = &mut self.socket;
        std::future::poll_fn(|cx| socket.poll_shutdown(cx)).await
    }
}

pub use decode::Decode;

mod decode {
    use std::{
        pin::Pin,
        task::{Context, Poll, ready},
    };

    use bytes::BytesMut;

    use super::{DEFAULT_BUF_CAPACITY, NzStream};
    use crate::{
        Result,
        connection::ConnectionClosed,
        net::io::poll_read,
        netezza::ProtocolError,
    };

    pin_project_lite::pin_project! {
        /// Future returned from [`NzStream::decode`].
        ///
        /// Dropping this future never loses data, bytes already read stay
        /// in the stream buffer.
        #[derive(Debug)]
        #[project = DecodeProject]
        pub struct Decode<'s, D> {
            pub(super) stream: &'s mut NzStream,
            pub(super) decoder: D,
        }
    }

    impl<D, T> Future for Decode<'_, D>
    where
        D: FnMut(&mut BytesMut) -> Result<Option<T>, ProtocolError>,
    {
        type Output = Result<T>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            let DecodeProject { stream, decoder } = self.project();

            loop {
                if let Some(value) = decoder(&mut stream.read_buf)? {
                    return Poll::Ready(Ok(value));
                }

                stream.read_buf.reserve(DEFAULT_BUF_CAPACITY);

                let n = ready!(poll_read(&mut stream.socket, &mut stream.read_buf, cx)?);
                if n == 0 {
                    return Poll::Ready(Err(ConnectionClosed.into()));
                }
            }
        }
    }
}
