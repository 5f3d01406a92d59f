//! Async I/O traits and utilities.

pub use tokio::io::{
    stdin, stdout, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeek,
    AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadBuf, Stdin, Stdout,
};
