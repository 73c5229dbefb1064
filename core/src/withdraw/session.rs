use std::sync::Arc;
use std::time::Duration;

use candid::Nat;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::balance::synchronizer::{BalanceState, BalanceSynchronizer, DEFAULT_POLL_INTERVAL};
use crate::ledger::session::Session;
use crate::tokens::token::Token;
use crate::tokens::token_amount::TokenAmount;
use crate::withdraw::form::{WithdrawForm, WithdrawalDraft};
use crate::withdraw::submitter::{SubmissionResult, TransferOutcome, TransferSubmitter};
use crate::withdraw::validation::ValidationResult;

pub const DEFAULT_SUCCESS_WINDOW: Duration = Duration::from_secs(2);

/// User input routed into the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormCommand {
    SelectToken(Option<Token>),
    SetAmount(String),
    SetMaximum(bool),
    SetDestination(String),
    Submit,
}

/// Read-only picture of the form after the last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormView {
    pub draft: WithdrawalDraft,
    pub balance: BalanceState,
    pub outcome: TransferOutcome,
    pub validation: ValidationResult,
    pub effective_amount: Option<TokenAmount>,
}

impl FormView {
    fn of(form: &WithdrawForm) -> Self {
        Self {
            draft: form.draft().clone(),
            balance: form.balance().clone(),
            outcome: form.outcome().clone(),
            validation: form.validate(),
            effective_amount: form.effective_amount(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.outcome, TransferOutcome::InFlight { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawSessionConfig {
    pub poll_interval: Duration,
    // how long a success stays visible before the form resets
    pub success_window: Duration,
}

impl Default for WithdrawSessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            success_window: DEFAULT_SUCCESS_WINDOW,
        }
    }
}

enum SessionEvent {
    TransferFinished { ticket: u64, result: SubmissionResult },
    SuccessWindowElapsed { ticket: u64 },
}

/// Handle to a running withdraw session. Dropping it tears the session down.
pub struct WithdrawHandle {
    commands: mpsc::UnboundedSender<FormCommand>,
    view: watch::Receiver<FormView>,
    task: JoinHandle<()>,
}

impl WithdrawHandle {
    pub fn send(&self, command: FormCommand) -> Result<(), mpsc::error::SendError<FormCommand>> {
        self.commands.send(command)
    }

    pub fn select_token(&self, token: Option<Token>) -> Result<(), mpsc::error::SendError<FormCommand>> {
        self.send(FormCommand::SelectToken(token))
    }

    pub fn set_amount(&self, raw: impl Into<String>) -> Result<(), mpsc::error::SendError<FormCommand>> {
        self.send(FormCommand::SetAmount(raw.into()))
    }

    pub fn set_maximum(&self, on: bool) -> Result<(), mpsc::error::SendError<FormCommand>> {
        self.send(FormCommand::SetMaximum(on))
    }

    pub fn set_destination(&self, destination: impl Into<String>) -> Result<(), mpsc::error::SendError<FormCommand>> {
        self.send(FormCommand::SetDestination(destination.into()))
    }

    pub fn submit(&self) -> Result<(), mpsc::error::SendError<FormCommand>> {
        self.send(FormCommand::Submit)
    }

    pub fn view(&self) -> FormView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FormView> {
        self.view.clone()
    }

    /// Waits until a published view satisfies `predicate`.
    ///
    /// Returns `None` if the session ends first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<FormView>
    where
        F: FnMut(&FormView) -> bool,
    {
        let mut view = self.view.clone();
        loop {
            {
                let current = view.borrow_and_update();
                if predicate(&current) {
                    return Some(current.clone());
                }
            }
            view.changed().await.ok()?;
        }
    }
}

impl Drop for WithdrawHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a withdraw form bound to `session`, with its own balance poller.
pub fn spawn_withdraw_session(session: watch::Receiver<Session>, config: WithdrawSessionConfig) -> WithdrawHandle {
    let service_identity = session.borrow().service_identity;

    let (selection, selection_rx) = watch::channel(None);
    let synchronizer = BalanceSynchronizer::new(session.clone(), selection_rx, config.poll_interval);
    let balance = synchronizer.subscribe();

    let form = WithdrawForm::new(service_identity);
    let (view_tx, view) = watch::channel(FormView::of(&form));
    let (commands, commands_rx) = mpsc::unbounded_channel();
    let (events, events_rx) = mpsc::unbounded_channel();

    let event_loop = WithdrawSession {
        form,
        selection,
        synchronizer,
        balance,
        submitter: Arc::new(TransferSubmitter::new(session.clone())),
        session,
        view: view_tx,
        events,
        success_window: config.success_window,
    };

    WithdrawHandle {
        commands,
        view,
        task: tokio::spawn(event_loop.run(commands_rx, events_rx)),
    }
}

struct WithdrawSession {
    form: WithdrawForm,
    selection: watch::Sender<Option<Token>>,
    synchronizer: BalanceSynchronizer,
    balance: watch::Receiver<BalanceState>,
    session: watch::Receiver<Session>,
    submitter: Arc<TransferSubmitter>,
    view: watch::Sender<FormView>,
    events: mpsc::UnboundedSender<SessionEvent>,
    success_window: Duration,
}

impl WithdrawSession {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<FormCommand>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let _poller = self.synchronizer.spawn();
        let mut tasks = JoinSet::new();
        let mut session_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command, &mut tasks),
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event, &mut tasks),
                changed = self.balance.changed() => {
                    if changed.is_ok() {
                        let balance = self.balance.borrow_and_update().clone();
                        self.form.on_balance(balance);
                    }
                }
                changed = self.session.changed(), if session_open => {
                    match changed {
                        Ok(()) => {
                            let service_identity = self.session.borrow_and_update().service_identity;
                            self.form.set_service_identity(service_identity);
                        }
                        Err(_) => session_open = false,
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined
                        && err.is_panic()
                    {
                        warn!("[withdraw] session task panicked: {}", err);
                    }
                }
            }

            self.publish();
        }

        tasks.abort_all();
        debug!("[withdraw] session closed");
    }

    fn apply(&mut self, command: FormCommand, tasks: &mut JoinSet<()>) {
        match command {
            FormCommand::SelectToken(token) => {
                self.form.select_token(token);
                self.selection.send_if_modified(|current| {
                    if *current == token {
                        return false;
                    }
                    *current = token;
                    true
                });
            }
            FormCommand::SetAmount(raw) => {
                self.form.set_amount(&raw);
            }
            FormCommand::SetMaximum(on) => self.form.set_maximum(on),
            FormCommand::SetDestination(destination) => self.form.set_destination(destination),
            FormCommand::Submit => self.submit(tasks),
        }
    }

    fn submit(&mut self, tasks: &mut JoinSet<()>) {
        let Some(request) = self.form.begin_submission() else {
            debug!("[withdraw] submit ignored: form not submittable or transfer in flight");
            return;
        };

        info!(
            "[withdraw] submission {} started for {} {}",
            request.ticket,
            TokenAmount::from_units(request.token, request.amount.clone()).plain(),
            request.token
        );

        let submitter = self.submitter.clone();
        let events = self.events.clone();
        tasks.spawn(async move {
            let result = submitter.execute(&request).await;
            let _ = events.send(SessionEvent::TransferFinished {
                ticket: request.ticket,
                result,
            });
        });
    }

    fn on_event(&mut self, event: SessionEvent, tasks: &mut JoinSet<()>) {
        match event {
            SessionEvent::TransferFinished { ticket, result } => {
                let succeeded = matches!(result, SubmissionResult::Succeeded { .. });
                if !self.form.complete_submission(ticket, result) {
                    debug!("[withdraw] dropping result of submission {}", ticket);
                    return;
                }
                if succeeded {
                    self.start_success_window(ticket, tasks);
                }
            }
            SessionEvent::SuccessWindowElapsed { ticket } => {
                self.form.clear_success(ticket);
            }
        }
    }

    fn start_success_window(&self, ticket: u64, tasks: &mut JoinSet<()>) {
        let events = self.events.clone();
        let window = self.success_window;
        tasks.spawn(async move {
            tokio::time::sleep(window).await;
            let _ = events.send(SessionEvent::SuccessWindowElapsed { ticket });
        });
    }

    fn publish(&self) {
        let next = FormView::of(&self.form);
        self.view.send_if_modified(|view| {
            if *view == next {
                return false;
            }
            *view = next;
            true
        });
    }
}

/// Block index of a view that just succeeded.
pub fn succeeded_block(view: &FormView) -> Option<&Nat> {
    match &view.outcome {
        TransferOutcome::Succeeded { block_index, .. } => Some(block_index),
        _ => None,
    }
}
