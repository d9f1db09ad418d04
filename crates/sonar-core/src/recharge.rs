//! Recharge wizard
//!
//! The consumer-facing step machine over a payment order: amount and method
//! selection, order creation, payment polling, settled. Poll events are
//! relayed into the wizard by an internal observer; the engines never touch
//! the step directly.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::poll::{PollHandle, PollObserver, StatusPoller, StatusSource};
use crate::status::{OperationId, OperationState};

/// Payment channel offered by the recharge flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayMethod {
    Wechat,
    Alipay,
}

impl PayMethod {
    /// Label used on the wire when creating an order
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wechat => "wechat",
            Self::Alipay => "alipay",
        }
    }
}

/// Current step of the recharge wizard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RechargeStep {
    /// Choosing the recharge amount
    SelectAmount,
    /// Choosing the payment method
    SelectMethod,
    /// Order/QR code being generated by the backend
    Generating,
    /// Waiting for the payment to complete
    Waiting,
    /// Payment confirmed
    Succeeded,
    /// Order creation or payment failed
    Failed { reason: String },
}

/// A user action that does not apply to the current step
#[derive(Debug, Error)]
pub enum RechargeError {
    #[error("cannot {action} while in step {step:?}")]
    InvalidAction {
        action: &'static str,
        step: RechargeStep,
    },
}

struct FlowState {
    step: RechargeStep,
    amount_cents: Option<u64>,
    method: Option<PayMethod>,
    handle: Option<PollHandle>,
    scanned: bool,
    last_transport_error: Option<String>,
    /// Bumped on reset and on each new order so stale relayed events drop
    epoch: u64,
}

struct Shared {
    state: Mutex<FlowState>,
    steps: watch::Sender<RechargeStep>,
}

impl Shared {
    /// Move the wizard forward; called with the state lock held so watchers
    /// always observe steps in order
    fn advance(&self, state: &mut FlowState, step: RechargeStep) {
        debug!("Recharge step {:?} -> {:?}", state.step, step);
        state.step = step.clone();
        self.steps.send_replace(step);
    }
}

/// Drives one recharge at a time; start over with [`reset`](Self::reset)
pub struct RechargeController {
    poller: StatusPoller,
    source: Arc<dyn StatusSource>,
    config: PollConfig,
    shared: Arc<Shared>,
}

impl RechargeController {
    pub fn new(source: Arc<dyn StatusSource>, config: PollConfig) -> Self {
        let (steps, _) = watch::channel(RechargeStep::SelectAmount);
        Self {
            poller: StatusPoller::new(),
            source,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(FlowState {
                    step: RechargeStep::SelectAmount,
                    amount_cents: None,
                    method: None,
                    handle: None,
                    scanned: false,
                    last_transport_error: None,
                    epoch: 0,
                }),
                steps,
            }),
        }
    }

    /// Current wizard step
    pub fn step(&self) -> RechargeStep {
        self.shared.state.lock().step.clone()
    }

    /// Watch step changes; the receiver starts at the current step
    pub fn subscribe(&self) -> watch::Receiver<RechargeStep> {
        self.shared.steps.subscribe()
    }

    pub fn selected_amount(&self) -> Option<u64> {
        self.shared.state.lock().amount_cents
    }

    pub fn selected_method(&self) -> Option<PayMethod> {
        self.shared.state.lock().method
    }

    /// An order is being generated or awaited
    pub fn in_progress(&self) -> bool {
        matches!(
            self.step(),
            RechargeStep::Generating | RechargeStep::Waiting
        )
    }

    /// The flow reached a terminal step
    pub fn is_settled(&self) -> bool {
        matches!(
            self.step(),
            RechargeStep::Succeeded | RechargeStep::Failed { .. }
        )
    }

    /// The QR code was scanned but payment is not confirmed yet
    pub fn scanned(&self) -> bool {
        self.shared.state.lock().scanned
    }

    /// Most recent transport-level polling failure, for a UI notice
    pub fn last_transport_error(&self) -> Option<String> {
        self.shared.state.lock().last_transport_error.clone()
    }

    /// Whether the order poll session is still running
    pub fn polling_live(&self) -> bool {
        self.shared
            .state
            .lock()
            .handle
            .as_ref()
            .is_some_and(PollHandle::is_live)
    }

    /// Record the amount and move on to method selection
    pub fn select_amount(&self, cents: u64) -> Result<(), RechargeError> {
        let mut state = self.shared.state.lock();
        if state.step != RechargeStep::SelectAmount {
            return Err(RechargeError::InvalidAction {
                action: "select an amount",
                step: state.step.clone(),
            });
        }
        state.amount_cents = Some(cents);
        self.shared.advance(&mut state, RechargeStep::SelectMethod);
        Ok(())
    }

    /// Record the payment method
    ///
    /// The caller then creates the order with its payment client and reports
    /// back through [`order_created`](Self::order_created) or
    /// [`order_failed`](Self::order_failed).
    pub fn select_method(&self, method: PayMethod) -> Result<(), RechargeError> {
        let mut state = self.shared.state.lock();
        if state.step != RechargeStep::SelectMethod {
            return Err(RechargeError::InvalidAction {
                action: "select a method",
                step: state.step.clone(),
            });
        }
        state.method = Some(method);
        self.shared.advance(&mut state, RechargeStep::Generating);
        Ok(())
    }

    /// The backend created the order: start watching it
    ///
    /// Any previous poll session is stopped first; the wizard never owns
    /// more than one.
    pub fn order_created(&self, id: OperationId) -> Result<(), RechargeError> {
        let mut state = self.shared.state.lock();
        if state.step != RechargeStep::Generating {
            return Err(RechargeError::InvalidAction {
                action: "attach an order",
                step: state.step.clone(),
            });
        }
        if let Some(previous) = state.handle.take() {
            previous.stop();
        }
        state.epoch += 1;
        state.scanned = false;
        state.last_transport_error = None;
        self.shared.advance(&mut state, RechargeStep::Waiting);

        let relay = StepRelay {
            shared: Arc::clone(&self.shared),
            epoch: state.epoch,
        };
        let handle = self
            .poller
            .start(id, Arc::clone(&self.source), relay, self.config.clone());
        state.handle = Some(handle);
        Ok(())
    }

    /// Order creation failed before a pollable order existed
    pub fn order_failed(&self, reason: impl Into<String>) {
        let mut state = self.shared.state.lock();
        if state.step != RechargeStep::Generating {
            warn!("Ignoring order failure reported in step {:?}", state.step);
            return;
        }
        self.shared.advance(
            &mut state,
            RechargeStep::Failed {
                reason: reason.into(),
            },
        );
    }

    /// Back to the first step; stops any live poll session
    ///
    /// Safe at any step, idempotent.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        if let Some(handle) = state.handle.take() {
            debug!("Reset stops the poll session for {}", handle.operation_id());
            handle.stop();
        }
        state.epoch += 1;
        state.amount_cents = None;
        state.method = None;
        state.scanned = false;
        state.last_transport_error = None;
        if state.step != RechargeStep::SelectAmount {
            info!("Recharge flow reset from {:?}", state.step);
            self.shared.advance(&mut state, RechargeStep::SelectAmount);
        }
    }
}

/// Relays poll callbacks into the wizard; events from a superseded session
/// (older epoch) are dropped
struct StepRelay {
    shared: Arc<Shared>,
    epoch: u64,
}

impl StepRelay {
    fn with_state(&self, f: impl FnOnce(&Shared, &mut FlowState)) {
        let mut state = self.shared.state.lock();
        if state.epoch != self.epoch {
            debug!("Dropping poll event from a superseded recharge session");
            return;
        }
        f(&self.shared, &mut state);
    }
}

impl PollObserver for StepRelay {
    fn on_status_change(&mut self, state: OperationState) {
        self.with_state(|_, flow| {
            // Terminal steps are driven by the dedicated callbacks below
            if state == OperationState::Scanned {
                flow.scanned = true;
            }
        });
    }

    fn on_success(&mut self, id: &OperationId) {
        info!("Order {} paid", id);
        self.with_state(|shared, flow| {
            flow.handle = None;
            shared.advance(flow, RechargeStep::Succeeded);
        });
    }

    fn on_failed(&mut self, reason: String) {
        self.with_state(|shared, flow| {
            flow.handle = None;
            shared.advance(flow, RechargeStep::Failed { reason });
        });
    }

    fn on_expired(&mut self) {
        self.with_state(|shared, flow| {
            flow.handle = None;
            shared.advance(
                flow,
                RechargeStep::Failed {
                    reason: "payment window expired".to_string(),
                },
            );
        });
    }

    fn on_error(&mut self, message: String) {
        self.with_state(|_, flow| {
            flow.last_transport_error = Some(message);
        });
    }
}
