use crate::error::TaskError;
use crate::runtime::Runtime;
use crate::task::{Coroutine, Step};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Cooperative scheduler hint: suspends once to let other tasks run.
///
/// For `async` bodies adapted with [`from_future`](crate::task::from_future). The returned
/// future is `Pending` the first time it is polled, which the runtime treats as a suspension;
/// the next resumption finds it ready.
pub async fn yield_now() {
    struct YieldOnce(bool);

    impl Future for YieldOnce {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            if !self.0 {
                self.0 = true;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            Poll::Ready(())
        }
    }

    YieldOnce(false).await
}

/// The same single suspension point as a [`Coroutine`].
#[derive(Debug, Default, Clone)]
pub struct YieldNow {
    yielded: bool,
}

impl YieldNow {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Coroutine for YieldNow {
    type Output = ();

    fn resume(&mut self, _rt: &Runtime) -> Result<Step<()>, TaskError> {
        if self.yielded {
            Ok(Step::Done(()))
        } else {
            self.yielded = true;
            Ok(Step::Yield)
        }
    }
}
