//! Lazily opened blob streams

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use content_store::{ContentReader, Descriptor, Store, StoreError};
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, ReadBuf};

use crate::descriptor::complete;
use crate::error::{RegistryError, RegistryResult};

/// Lifecycle of a [`BlobStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No store reader has been requested yet.
    Unopened,
    /// A store reader is held.
    Opened,
    /// The stream was closed; any reader has been released.
    Closed,
}

enum State {
    Unopened,
    Opening(BoxFuture<'static, Result<ContentReader, StoreError>>),
    Opened(ContentReader),
    Closed,
}

/// A byte stream over one blob in the content store.
///
/// The store reader is opened on the first read (or an explicit
/// [`open`](BlobStream::open)) and released by [`close`](BlobStream::close)
/// or when the stream is dropped, whichever comes first.
pub struct BlobStream {
    store: Store,
    descriptor: Descriptor,
    state: State,
}

impl fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStream")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .finish()
    }
}

impl BlobStream {
    /// Create a stream for `descriptor`, completing its size and media type
    /// from the store.
    ///
    /// Fails with [`RegistryError::BlobNotFound`] if the store does not hold
    /// the digest.
    pub async fn new(store: Store, descriptor: Descriptor) -> RegistryResult<Self> {
        let mut stream = Self::unverified(store, descriptor);
        match complete(&stream.store, stream.descriptor.clone()).await {
            Ok(descriptor) => {
                stream.descriptor = descriptor;
                Ok(stream)
            }
            Err(err) => {
                stream.close();
                Err(err)
            }
        }
    }

    /// Create a stream for `descriptor` exactly as given, without asking the
    /// store whether the blob exists.
    pub fn unverified(store: Store, descriptor: Descriptor) -> Self {
        Self {
            store,
            descriptor,
            state: State::Unopened,
        }
    }

    /// The descriptor of the blob.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Consume the stream, releasing the reader and keeping the descriptor.
    pub fn into_descriptor(mut self) -> Descriptor {
        self.close();
        self.descriptor.clone()
    }

    /// Where the stream is in its lifecycle.
    pub fn state(&self) -> StreamState {
        match self.state {
            State::Unopened | State::Opening(_) => StreamState::Unopened,
            State::Opened(_) => StreamState::Opened,
            State::Closed => StreamState::Closed,
        }
    }

    /// Open the store reader now instead of on first read.
    ///
    /// Does nothing if the reader is already open.
    pub async fn open(&mut self) -> RegistryResult<()> {
        let result = match &mut self.state {
            State::Opened(_) => return Ok(()),
            State::Closed => return Err(closed().into()),
            State::Unopened => self.store.reader(&self.descriptor.digest).await,
            State::Opening(open) => open.await,
        };

        match result {
            Ok(reader) => {
                self.opened(reader);
                Ok(())
            }
            Err(err) => {
                self.state = State::Unopened;
                Err(RegistryError::blob(&self.descriptor.digest, err))
            }
        }
    }

    /// Release the store reader, if one is open.
    ///
    /// Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        if let State::Opened(reader) = std::mem::replace(&mut self.state, State::Closed) {
            drop(reader);
            tracing::trace!(digest = %self.descriptor.digest, "released blob reader");
        }
    }

    fn opened(&mut self, reader: ContentReader) {
        tracing::trace!(digest = %self.descriptor.digest, size = reader.size(), "opened blob reader");
        self.state = State::Opened(reader);
    }
}

fn closed() -> io::Error {
    io::Error::other("blob stream is closed")
}

impl Drop for BlobStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl AsyncRead for BlobStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Unopened => {
                    let store = this.store.clone();
                    let digest = this.descriptor.digest.clone();
                    this.state =
                        State::Opening(Box::pin(async move { store.reader(&digest).await }));
                }
                State::Opening(open) => match ready!(open.as_mut().poll(cx)) {
                    Ok(reader) => this.opened(reader),
                    Err(err) => {
                        this.state = State::Unopened;
                        let kind = if err.is_not_found() {
                            io::ErrorKind::NotFound
                        } else {
                            io::ErrorKind::Other
                        };
                        return Poll::Ready(Err(io::Error::new(kind, err)));
                    }
                },
                State::Opened(reader) => return Pin::new(reader).poll_read(cx, buf),
                State::Closed => return Poll::Ready(Err(closed())),
            }
        }
    }
}
