//! Buffered byte channel to the server.
//!
//! Requests are buffered with [`Channel::send`] and written with
//! [`Channel::flush`]. Responses are read piecewise, since most response
//! layouts are only known after reading part of them.
//!
//! Once negotiated, bytes written are deflated then encrypted, and bytes read
//! are decrypted then inflated.
use bytes::{Buf, Bytes, BytesMut};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    Result,
    common::verbose,
    ext::xdr_pad,
    firebird::{
        FrontendProtocol, ProtocolError,
        backend::{BackendProtocol, Response},
        frontend, op,
    },
    net::Socket,
};

pub mod cipher;

pub use cipher::{Cipher, Plugin};

const DEFAULT_BUF_CAPACITY: usize = 1024;
const READ_CHUNK: usize = 8192;

/// Buffered connection to the server.
#[derive(Debug)]
pub struct Channel {
    socket: Socket,
    /// Plain bytes ready to be parsed.
    read_buf: BytesMut,
    write_buf: BytesMut,
    cipher: Option<Cipher>,
    zlib: Option<Zlib>,
}

struct Zlib {
    deflate: Compress,
    inflate: Decompress,
}

impl std::fmt::Debug for Zlib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Zlib")
    }
}

impl Channel {
    pub fn new(socket: Socket) -> Channel {
        Channel {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            cipher: None,
            zlib: None,
        }
    }

    pub async fn connect(host: &str, port: u16) -> Result<Channel> {
        Ok(Channel::new(Socket::connect_tcp(host, port).await?))
    }

    /// Buffer a request, nothing is written until [`Channel::flush`].
    pub fn send<F: FrontendProtocol>(&mut self, msg: F) {
        frontend::write(msg, &mut self.write_buf);
    }

    /// Buffer raw bytes.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.write_buf.extend_from_slice(bytes);
    }

    /// Encrypt every byte from now on, in both directions.
    ///
    /// Must be installed right after the request that negotiates it is
    /// flushed, before its response is read.
    pub fn install_cipher(&mut self, cipher: Cipher) {
        verbose!("wire crypt enabled: {}", cipher.name());
        self.cipher = Some(cipher);
    }

    pub fn cipher(&self) -> Option<&Cipher> {
        self.cipher.as_ref()
    }

    /// Deflate every byte from now on, in both directions.
    pub fn enable_compression(&mut self) {
        verbose!("wire compression enabled");
        self.zlib = Some(Zlib {
            deflate: Compress::new(Compression::default(), true),
            inflate: Decompress::new(true),
        });
    }

    pub fn is_compressed(&self) -> bool {
        self.zlib.is_some()
    }

    /// Write all buffered requests.
    pub async fn flush(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }

        let mut out = match &mut self.zlib {
            Some(zlib) => deflate(&mut zlib.deflate, &self.write_buf)?,
            None => self.write_buf.to_vec(),
        };
        self.write_buf.clear();

        if let Some(cipher) = &mut self.cipher {
            cipher.encrypt(&mut out);
        }

        self.socket.write_all(&out).await?;
        self.socket.flush().await?;
        Ok(())
    }

    /// Shutdown write half of the socket.
    pub async fn close(&mut self) -> Result<()> {
        self.socket.shutdown().await?;
        Ok(())
    }

    /// Read until at least `len` plain bytes are buffered.
    async fn fill(&mut self, len: usize) -> Result<()> {
        let mut raw = vec![0u8; READ_CHUNK];
        while self.read_buf.len() < len {
            let n = self.socket.read(&mut raw).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }

            let chunk = &mut raw[..n];
            if let Some(cipher) = &mut self.cipher {
                cipher.decrypt(chunk);
            }

            match &mut self.zlib {
                Some(zlib) => {
                    let plain = inflate(&mut zlib.inflate, chunk)?;
                    self.read_buf.extend_from_slice(&plain);
                },
                None => self.read_buf.extend_from_slice(chunk),
            }
        }
        Ok(())
    }

    /// Read the next opcode, skipping keepalive `op_dummy`.
    pub async fn read_opcode(&mut self) -> Result<u32> {
        loop {
            match self.read_u32().await? {
                op::DUMMY => continue,
                opcode => {
                    verbose!("(B) {}", op::name(opcode));
                    return Ok(opcode);
                },
            }
        }
    }

    /// Receive a response of type `B`.
    ///
    /// A generic response received instead is read fully, its error returned.
    pub async fn recv<B: BackendProtocol>(&mut self) -> Result<B> {
        let opcode = self.read_opcode().await?;
        if opcode == B::OPCODE {
            return B::decode(self).await;
        }
        if opcode == op::RESPONSE {
            Response::decode(self).await?.into_result()?;
        }
        Err(ProtocolError::unexpected(B::OPCODE, opcode).into())
    }

    pub async fn read_u32(&mut self) -> Result<u32> {
        self.fill(4).await?;
        Ok(self.read_buf.get_u32())
    }

    pub async fn read_i32(&mut self) -> Result<i32> {
        self.fill(4).await?;
        Ok(self.read_buf.get_i32())
    }

    pub async fn read_u64(&mut self) -> Result<u64> {
        self.fill(8).await?;
        Ok(self.read_buf.get_u64())
    }

    /// Read exactly `len` bytes.
    pub async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        self.fill(len).await?;
        Ok(self.read_buf.split_to(len).freeze())
    }

    /// Read `len` bytes and skip its padding.
    pub async fn read_aligned(&mut self, len: usize) -> Result<Bytes> {
        let pad = xdr_pad(len);
        self.fill(len + pad).await?;
        let value = self.read_buf.split_to(len).freeze();
        self.read_buf.advance(pad);
        Ok(value)
    }

    /// Read length prefixed and padded bytes.
    pub async fn read_xdr_bytes(&mut self) -> Result<Bytes> {
        let len = self.read_u32().await? as usize;
        self.read_aligned(len).await
    }

    /// Read length prefixed and padded string, invalid utf8 is replaced.
    pub async fn read_xdr_string(&mut self) -> Result<String> {
        let bytes = self.read_xdr_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Deflate `input` with a sync flush, so the peer can inflate it immediately.
fn deflate(zlib: &mut Compress, mut input: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() + 64);
    loop {
        let before = zlib.total_in();
        zlib.compress_vec(input, &mut out, FlushCompress::Sync)?;
        input = &input[(zlib.total_in() - before) as usize..];
        if input.is_empty() && out.len() < out.capacity() {
            return Ok(out);
        }
        out.reserve(out.capacity().max(64));
    }
}

fn inflate(zlib: &mut Decompress, mut input: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 4 + 64);
    loop {
        let before = zlib.total_in();
        zlib.decompress_vec(input, &mut out, FlushDecompress::Sync)?;
        input = &input[(zlib.total_in() - before) as usize..];
        if input.is_empty() && out.len() < out.capacity() {
            return Ok(out);
        }
        out.reserve(out.capacity().max(64));
    }
}

#[cfg(test)]
pub(crate) mod test {
    use bytes::BufMut;
    use tokio::io::DuplexStream;

    use super::*;
    use crate::{ext::BufMutExt, firebird::frontend::Commit};

    /// Client channel and the raw server end of the pipe.
    pub fn pair() -> (Channel, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (Channel::new(Socket::duplex(client)), server)
    }

    /// Server end speaking the same channel codec.
    pub fn peer_pair() -> (Channel, Channel) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (Channel::new(Socket::duplex(client)), Channel::new(Socket::duplex(server)))
    }

    #[tokio::test]
    async fn piecewise_read() {
        let (mut chan, mut server) = pair();
        let mut buf = BytesMut::new();
        buf.put_u32(42);
        buf.put_xdr_bytes(b"hello");
        buf.put_u32(7);
        server.write_all(&buf).await.unwrap();

        assert_eq!(chan.read_u32().await.unwrap(), 42);
        assert_eq!(&chan.read_xdr_bytes().await.unwrap()[..], b"hello");
        assert_eq!(chan.read_u32().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn eof_is_error() {
        let (mut chan, server) = pair();
        drop(server);
        assert!(chan.read_u32().await.is_err());
    }

    #[tokio::test]
    async fn crypt_and_compress_roundtrip() {
        let (mut client, mut server) = peer_pair();
        let key = [3u8; 20];
        for chan in [&mut client, &mut server] {
            chan.enable_compression();
            chan.install_cipher(Cipher::new("ChaCha", &key, &[9; 12]).unwrap());
        }

        client.send(Commit { handle: 5 });
        client.send_raw(&[0, 0, 0, 1]);
        client.flush().await.unwrap();
        client.send(Commit { handle: 6 });
        client.flush().await.unwrap();

        assert_eq!(server.read_u32().await.unwrap(), crate::firebird::op::COMMIT);
        assert_eq!(server.read_u32().await.unwrap(), 5);
        assert_eq!(server.read_u32().await.unwrap(), 1);
        assert_eq!(server.read_u32().await.unwrap(), crate::firebird::op::COMMIT);
        assert_eq!(server.read_u32().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn encrypted_bytes_differ_on_wire() {
        let (mut chan, mut server) = pair();
        chan.install_cipher(Cipher::new("Arc4", &[1; 20], &[]).unwrap());
        chan.send(Commit { handle: 5 });
        chan.flush().await.unwrap();

        let mut raw = [0u8; 8];
        server.read_exact(&mut raw).await.unwrap();
        assert_ne!(&raw[..4], &crate::firebird::op::COMMIT.to_be_bytes());
    }
}
