//! Unexpected-shutdown notification shared by every backend.
//!
//! Backends own a [`ShutdownNotifier`] and hand out [`ShutdownSignal`]s. A
//! backend that only knows how to register callbacks wraps its registration
//! hook with [`ShutdownSignal::from_callback`], so observers always see the
//! same awaitable shape.
//!
//! A notifier fires at most once. Cancellation is the normal-teardown path
//! and observers treat it as a no-op.

use std::sync::Arc;

use tokio::sync::watch;

/// Terminal state of a shutdown signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownEvent {
	/// The backend went away on its own; carries the cause.
	Unexpected(String),
	/// Notification withdrawn, usually because the session ended normally.
	Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
	Armed,
	Fired(ShutdownEvent),
}

/// Callback handed to callback-style backends.
pub type ShutdownCallback = Box<dyn FnOnce(ShutdownEvent) + Send + 'static>;

/// Sending half, owned by a backend.
#[derive(Debug, Clone)]
pub struct ShutdownNotifier {
	tx: Arc<watch::Sender<State>>,
}

impl Default for ShutdownNotifier {
	fn default() -> Self {
		Self::new()
	}
}

impl ShutdownNotifier {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(State::Armed);
		Self { tx: Arc::new(tx) }
	}

	pub fn subscribe(&self) -> ShutdownSignal {
		ShutdownSignal {
			rx: self.tx.subscribe(),
		}
	}

	/// Reports an unexpected shutdown. Returns `false` if already fired.
	pub fn notify(&self, cause: impl Into<String>) -> bool {
		self.fire(ShutdownEvent::Unexpected(cause.into()))
	}

	/// Withdraws the notification. Returns `false` if already fired.
	pub fn cancel(&self) -> bool {
		self.fire(ShutdownEvent::Cancelled)
	}

	pub fn fire(&self, event: ShutdownEvent) -> bool {
		self.tx.send_if_modified(|state| match state {
			State::Armed => {
				*state = State::Fired(event);
				true
			}
			State::Fired(_) => false,
		})
	}

	pub fn is_fired(&self) -> bool {
		matches!(*self.tx.borrow(), State::Fired(_))
	}
}

/// Receiving half, awaited by the shutdown observer.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
	rx: watch::Receiver<State>,
}

impl ShutdownSignal {
	/// Adapts a callback-registration hook into a signal.
	///
	/// Dropping the callback without invoking it resolves the signal as
	/// [`ShutdownEvent::Cancelled`].
	pub fn from_callback<F>(register: F) -> Self
	where
		F: FnOnce(ShutdownCallback),
	{
		let notifier = ShutdownNotifier::new();
		let signal = notifier.subscribe();
		register(Box::new(move |event| {
			notifier.fire(event);
		}));
		signal
	}

	/// Resolves once the notifier fires, or as cancelled if it is dropped.
	pub async fn wait(mut self) -> ShutdownEvent {
		loop {
			if let State::Fired(event) = &*self.rx.borrow_and_update() {
				return event.clone();
			}
			if self.rx.changed().await.is_err() {
				if let State::Fired(event) = &*self.rx.borrow() {
					return event.clone();
				}
				return ShutdownEvent::Cancelled;
			}
		}
	}
}
