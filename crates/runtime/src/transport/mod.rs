//! Frame codec for backend byte streams.
//!
//! Each message is sent as a little-endian `u32` length prefix followed by
//! the JSON body:
//!
//! ```text
//! [len: u32 LE][json bytes; len]
//! ```
//!
//! [`FrameWriter::write`] only buffers; several frames can be queued and sent
//! with a single [`FrameWriter::flush`].


use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};

use crate::error::{Error, Result};

/// Largest frame body accepted from a peer (32 MiB).
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

/// Reads length-prefixed JSON frames.
pub struct FrameReader<R> {
	reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
	pub fn new(reader: R) -> Self {
		Self { reader }
	}

	/// Reads and decodes the next frame.
	///
	/// End of stream before a complete frame yields [`Error::ConnectionClosed`].
	pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
		let mut len_buf = [0u8; 4];
		self.reader
			.read_exact(&mut len_buf)
			.await
			.map_err(eof_as_closed)?;

		let length = u32::from_le_bytes(len_buf) as usize;
		if length > MAX_FRAME_LEN {
			return Err(Error::Protocol(format!(
				"frame of {length} bytes exceeds limit of {MAX_FRAME_LEN}"
			)));
		}

		let mut body = vec![0u8; length];
		self.reader
			.read_exact(&mut body)
			.await
			.map_err(eof_as_closed)?;

		Ok(serde_json::from_slice(&body)?)
	}
}

/// Writes length-prefixed JSON frames through a buffer.
pub struct FrameWriter<W: AsyncWrite> {
	writer: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
	pub fn new(writer: W) -> Self {
		Self {
			writer: BufWriter::new(writer),
		}
	}

	/// Encodes one frame into the buffer without flushing.
	pub async fn write<T: Serialize>(&mut self, message: &T) -> Result<()> {
		let body = serde_json::to_vec(message)?;
		if body.len() > MAX_FRAME_LEN {
			return Err(Error::Protocol(format!(
				"frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
				body.len()
			)));
		}
		self.writer
			.write_all(&(body.len() as u32).to_le_bytes())
			.await?;
		self.writer.write_all(&body).await?;
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<()> {
		self.writer.flush().await?;
		Ok(())
	}

	/// Encodes one frame and flushes it.
	pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
		self.write(message).await?;
		self.flush().await
	}

	/// Flushes pending frames and shuts down the write side.
	pub async fn shutdown(&mut self) -> Result<()> {
		self.writer.shutdown().await?;
		Ok(())
	}
}

/// Boxed read half used by [`Connection`](crate::Connection).
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half used by [`Connection`](crate::Connection).
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Splits a byte stream into a frame reader and writer.
pub fn framed<S>(stream: S) -> (FrameReader<BoxReader>, FrameWriter<BoxWriter>)
where
	S: AsyncRead + AsyncWrite + Send + 'static,
{
	let (read, write): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
	(
		FrameReader::new(Box::new(read) as BoxReader),
		FrameWriter::new(Box::new(write) as BoxWriter),
	)
}

fn eof_as_closed(error: std::io::Error) -> Error {
	if error.kind() == std::io::ErrorKind::UnexpectedEof {
		Error::ConnectionClosed
	} else {
		Error::Io(error)
	}
}
