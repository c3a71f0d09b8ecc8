// SPDX-License-Identifier: GPL-3.0-or-later
//! [`Stream`][futures::Stream] extensions.
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{ready, Stream};
use pin_project::pin_project;

pub(crate) trait StreamExt: Stream {
    /// Skip items whose key is the same as the last item that was passed through.
    fn filter_repeated_by<K, F>(self, key: F) -> FilterRepeatedBy<Self, K, F>
    where
        Self: Sized,
        K: PartialEq,
        F: FnMut(&Self::Item) -> K,
    {
        FilterRepeatedBy::new(self, key)
    }

    fn never_error<E>(self) -> OkStream<Self, E>
    where
        Self: Sized,
    {
        OkStream::new(self)
    }
}

impl<St: Stream> StreamExt for St {}

#[pin_project]
#[derive(Debug)]
pub(crate) struct FilterRepeatedBy<St, K, F> {
    #[pin]
    stream: St,
    key: F,
    last_key: Option<K>,
}

impl<St, K, F> FilterRepeatedBy<St, K, F>
where
    St: Stream,
    K: PartialEq,
    F: FnMut(&St::Item) -> K,
{
    fn new(stream: St, key: F) -> Self {
        Self {
            stream,
            key,
            last_key: None,
        }
    }
}

impl<St, K, F> Stream for FilterRepeatedBy<St, K, F>
where
    St: Stream,
    K: PartialEq,
    F: FnMut(&St::Item) -> K,
{
    type Item = St::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        Poll::Ready(loop {
            if let Some(next_item) = ready!(this.stream.as_mut().poll_next(cx)) {
                let next_key = (this.key)(&next_item);
                if this.last_key.as_ref() != Some(&next_key) {
                    *this.last_key = Some(next_key);
                    break Some(next_item);
                }
            } else {
                break None;
            }
        })
    }
}

#[pin_project]
#[derive(Debug)]
pub(crate) struct OkStream<St, E> {
    #[pin]
    stream: St,
    phantom_error: PhantomData<E>,
}

impl<St: Stream, E> OkStream<St, E> {
    fn new(stream: St) -> Self {
        Self {
            stream,
            phantom_error: PhantomData,
        }
    }
}

impl<St: Stream, E> Stream for OkStream<St, E> {
    type Item = Result<St::Item, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        Poll::Ready(ready!(this.stream.poll_next(cx)).map(Result::<St::Item, E>::Ok))
    }
}
