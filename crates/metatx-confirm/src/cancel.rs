//! Cooperative cancellation for waits.

use tokio::sync::watch;

/// Caller side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

impl CancelHandle {
	/// Cancels every wait holding a signal from this handle.
	pub fn cancel(&self) {
		self.tx.send_replace(true);
	}

	pub fn signal(&self) -> CancelSignal {
		CancelSignal {
			rx: Some(self.tx.subscribe()),
		}
	}
}

/// Wait side of a cancellation pair. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
	rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
	/// A signal that never fires.
	pub fn never() -> Self {
		Self { rx: None }
	}

	pub fn is_cancelled(&self) -> bool {
		self.rx.as_ref().is_some_and(|rx| *rx.borrow())
	}

	/// Resolves once the paired handle cancels.
	///
	/// Pends forever if the handle is dropped without cancelling.
	pub async fn cancelled(&self) {
		let Some(rx) = &self.rx else {
			return std::future::pending().await;
		};

		let mut rx = rx.clone();
		loop {
			if *rx.borrow_and_update() {
				return;
			}
			if rx.changed().await.is_err() {
				return std::future::pending().await;
			}
		}
	}
}

impl Default for CancelSignal {
	fn default() -> Self {
		Self::never()
	}
}

/// Creates a linked handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
	let (tx, rx) = watch::channel(false);
	(CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}
