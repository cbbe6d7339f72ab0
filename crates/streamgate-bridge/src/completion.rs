use tokio::sync::watch;

use crate::channel::Delivery;

/// Resolves when the consumer of an output channel is done with it.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Delivery>,
}

impl Completion {
    pub(crate) fn new(rx: watch::Receiver<Delivery>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> Delivery {
        *self.rx.borrow()
    }

    /// Wait until delivery is `Finished` or `Closed`.
    pub async fn wait(&mut self) -> Delivery {
        let settled = self.rx.wait_for(|d| *d != Delivery::Open).await.is_ok();
        match self.current() {
            Delivery::Open if !settled => Delivery::Closed,
            other => other,
        }
    }

    /// Resolve only if the consumer goes away before reading the end of
    /// stream. Never resolves once delivery has finished.
    pub async fn disconnected(&mut self) {
        let _ = self.rx.wait_for(|d| *d != Delivery::Open).await;
        if self.current() == Delivery::Finished {
            std::future::pending::<()>().await;
        }
    }
}
