use std::sync::Arc;
use std::time::Duration;

use candid::Principal;
use chrono::{DateTime, Utc};
use icrc_ledger_types::icrc1::account::Account;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use crate::error::LedgerCallError;
use crate::ledger::session::Session;
use crate::tokens::token::Token;
use crate::tokens::token_amount::TokenAmount;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub owner: Principal,
    pub amount: TokenAmount,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BalanceState {
    #[default]
    Unknown,
    Known(BalanceSnapshot),
}

impl BalanceState {
    /// The known amount, but only when it belongs to `token`.
    pub fn amount_for(&self, token: Token) -> Option<&TokenAmount> {
        match self {
            BalanceState::Known(snapshot) if snapshot.amount.token == token => Some(&snapshot.amount),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&BalanceSnapshot> {
        match self {
            BalanceState::Known(snapshot) => Some(snapshot),
            BalanceState::Unknown => None,
        }
    }
}

/// Keeps the freshest balance of (connected identity, selected token).
///
/// Cheap to clone; all clones publish into the same `watch` channel.
#[derive(Clone)]
pub struct BalanceSynchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    session: watch::Receiver<Session>,
    selection: watch::Receiver<Option<Token>>,
    balance: watch::Sender<BalanceState>,
    poll_interval: Duration,
}

impl BalanceSynchronizer {
    pub fn new(
        session: watch::Receiver<Session>,
        selection: watch::Receiver<Option<Token>>,
        poll_interval: Duration,
    ) -> Self {
        let (balance, _) = watch::channel(BalanceState::Unknown);
        Self {
            inner: Arc::new(Inner {
                session,
                selection,
                balance,
                poll_interval,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BalanceState> {
        self.inner.balance.subscribe()
    }

    pub fn current(&self) -> BalanceState {
        self.inner.balance.borrow().clone()
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    /// Queries the ledger once without publishing anything.
    ///
    /// `Ok(None)` when the session cannot synchronize `token` (no identity,
    /// not connected or no ledger actor).
    pub async fn fetch(&self, token: Token) -> Result<Option<BalanceSnapshot>, LedgerCallError> {
        let (owner, ledger) = {
            let session = self.inner.session.borrow();
            (session.owner(), session.ledger(token))
        };
        let (Some(owner), Some(ledger)) = (owner, ledger) else {
            return Ok(None);
        };

        let account = Account { owner, subaccount: None };
        let value = ledger.balance_of(account).await?;

        Ok(Some(BalanceSnapshot {
            owner,
            amount: TokenAmount::from_units(token, value),
            observed_at: Utc::now(),
        }))
    }

    /// Refreshes the balance of `token` and publishes the result.
    ///
    /// A failed query keeps the previous balance. A result that arrives after
    /// the selection or the identity moved on is dropped.
    pub async fn refresh(&self, token: Option<Token>) {
        let Some(token) = token else {
            self.publish(BalanceState::Unknown);
            return;
        };

        let Some(owner) = self.inner.session.borrow().owner() else {
            self.publish(BalanceState::Unknown);
            return;
        };
        if self.is_current(owner, token) {
            self.invalidate_unless(owner, token);
        }

        match self.fetch(token).await {
            Ok(Some(snapshot)) => {
                if !self.is_current(snapshot.owner, token) {
                    debug!("[balance] dropping stale {} balance for {}", token, snapshot.owner);
                    return;
                }
                self.publish(BalanceState::Known(snapshot));
            }
            Ok(None) => {
                if self.is_current(owner, token) {
                    self.publish(BalanceState::Unknown);
                }
            }
            Err(err) => {
                warn!("[balance] could not fetch {} balance for {}: {}", token, owner, err);
            }
        }
    }

    /// Polls until the session or the selection channel closes.
    ///
    /// Refreshes run immediately on start and on every session or selection
    /// change, then every `poll_interval` while a token is selected.
    pub async fn run(self) {
        let mut session = self.inner.session.clone();
        let mut selection = self.inner.selection.clone();
        let period = self.inner.poll_interval;

        let mut refreshes = JoinSet::new();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // the first refresh covers whatever is current now
        session.borrow_and_update();
        let token = *selection.borrow_and_update();
        self.spawn_refresh(token, &mut refreshes);

        loop {
            tokio::select! {
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    session.borrow_and_update();
                    self.spawn_refresh(*selection.borrow(), &mut refreshes);
                    ticker.reset();
                }
                changed = selection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let token = *selection.borrow_and_update();
                    self.spawn_refresh(token, &mut refreshes);
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    let token = *selection.borrow();
                    if token.is_some() {
                        self.spawn_refresh(token, &mut refreshes);
                    }
                }
                Some(joined) = refreshes.join_next(), if !refreshes.is_empty() => {
                    if let Err(err) = joined
                        && err.is_panic()
                    {
                        warn!("[balance] refresh task panicked: {}", err);
                    }
                }
            }
        }

        refreshes.abort_all();
        debug!("[balance] synchronizer stopped");
    }

    /// Runs the poll loop on its own task. Dropping the handle stops it.
    pub fn spawn(&self) -> PollHandle {
        PollHandle {
            task: tokio::spawn(self.clone().run()),
        }
    }

    fn spawn_refresh(&self, token: Option<Token>, refreshes: &mut JoinSet<()>) {
        let this = self.clone();
        refreshes.spawn(async move { this.refresh(token).await });
    }

    fn is_current(&self, owner: Principal, token: Token) -> bool {
        *self.inner.selection.borrow() == Some(token) && self.inner.session.borrow().owner() == Some(owner)
    }

    // A balance of another token or identity must not outlive the switch.
    fn invalidate_unless(&self, owner: Principal, token: Token) {
        self.inner.balance.send_if_modified(|state| match state {
            BalanceState::Known(snapshot) if snapshot.owner != owner || snapshot.amount.token != token => {
                *state = BalanceState::Unknown;
                true
            }
            _ => false,
        });
    }

    fn publish(&self, next: BalanceState) {
        self.inner.balance.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}

/// Owns the spawned poll loop.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use candid::Nat;

    use super::*;
    use crate::ledger::actor::MockLedgerActor;
    use crate::ledger::session::LedgerHandles;
    use crate::test_support::{owner, service, wallet};

    fn connected(token: Token, actor: MockLedgerActor) -> Session {
        Session::connected(owner(), LedgerHandles::new().with(token, Arc::new(actor)), Some(service()))
    }

    fn counting_actor(calls: Arc<AtomicUsize>, units: u64) -> MockLedgerActor {
        let mut actor = MockLedgerActor::new();
        actor
            .expect_balance_of()
            .withf(|account| account.owner == owner() && account.subaccount.is_none())
            .returning(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Nat::from(units))
            });
        actor
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn refresh_publishes_the_ledger_balance() {
        // given
        let calls = Arc::new(AtomicUsize::new(0));
        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, counting_actor(calls.clone(), 150_000_000)));
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::Icp));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        // when
        sync.refresh(Some(Token::Icp)).await;

        // then
        let state = sync.current();
        let snapshot = state.snapshot().expect("balance should be known");
        assert_eq!(snapshot.owner, owner());
        assert_eq!(snapshot.amount, TokenAmount::from_units(Token::Icp, 150_000_000u64));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_balance() {
        // given: one good answer, then the replica fails
        let mut actor = MockLedgerActor::new();
        let mut seq = mockall::Sequence::new();
        actor
            .expect_balance_of()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Nat::from(42_000u64)));
        actor
            .expect_balance_of()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(LedgerCallError::transport("replica unavailable")));

        let (_session_tx, session_rx) = watch::channel(connected(Token::CkBtc, actor));
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::CkBtc));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        // when
        sync.refresh(Some(Token::CkBtc)).await;
        sync.refresh(Some(Token::CkBtc)).await;

        // then
        assert_eq!(
            sync.current().amount_for(Token::CkBtc),
            Some(&TokenAmount::from_units(Token::CkBtc, 42_000u64))
        );
    }

    #[tokio::test]
    async fn cleared_token_resets_to_unknown_without_a_query() {
        let mut actor = MockLedgerActor::new();
        actor.expect_balance_of().times(0);

        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, actor));
        let (_selection_tx, selection_rx) = watch::channel(None);
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        sync.refresh(None).await;

        assert_eq!(sync.current(), BalanceState::Unknown);
    }

    #[tokio::test]
    async fn no_identity_means_no_query_and_unknown_balance() {
        // given: a ledger actor exists but nobody is connected
        let mut actor = MockLedgerActor::new();
        actor.expect_balance_of().times(0);
        let mut session = connected(Token::Icp, actor);
        session.connected = false;

        let (_session_tx, session_rx) = watch::channel(session);
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::Icp));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        // when
        sync.refresh(Some(Token::Icp)).await;

        // then
        assert_eq!(sync.current(), BalanceState::Unknown);
        assert_eq!(sync.fetch(Token::Icp).await, Ok(None));
    }

    #[tokio::test]
    async fn missing_ledger_actor_is_not_an_error() {
        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, MockLedgerActor::new()));
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::CkBtc));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        sync.refresh(Some(Token::CkBtc)).await;

        assert_eq!(sync.current(), BalanceState::Unknown);
    }

    #[tokio::test]
    async fn late_result_for_a_previous_selection_is_dropped() {
        // given: the user switches to ckBTC while the ICP query is in flight
        let (selection_tx, selection_rx) = watch::channel(Some(Token::Icp));
        let selection_tx = Arc::new(selection_tx);
        let switcher = selection_tx.clone();

        let mut actor = MockLedgerActor::new();
        actor.expect_balance_of().times(1).returning(move |_| {
            switcher.send_replace(Some(Token::CkBtc));
            Ok(Nat::from(99u64))
        });

        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, actor));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        // when
        sync.refresh(Some(Token::Icp)).await;

        // then
        assert_eq!(sync.current(), BalanceState::Unknown);
    }

    #[tokio::test]
    async fn late_result_for_a_previous_identity_is_dropped() {
        let (session_tx, session_rx) = watch::channel(Session::default());
        let session_tx = Arc::new(session_tx);
        let switcher = session_tx.clone();

        let mut actor = MockLedgerActor::new();
        actor.expect_balance_of().times(1).returning(move |_| {
            switcher.send_modify(|session| session.identity = Some(wallet()));
            Ok(Nat::from(99u64))
        });
        session_tx.send_replace(connected(Token::Icp, actor));

        let (_selection_tx, selection_rx) = watch::channel(Some(Token::Icp));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        sync.refresh(Some(Token::Icp)).await;

        assert_eq!(sync.current(), BalanceState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_on_the_interval() {
        // given
        let calls = Arc::new(AtomicUsize::new(0));
        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, counting_actor(calls.clone(), 1)));
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::Icp));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        // when
        let _handle = sync.spawn();
        settle().await;

        // then
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_change_refreshes_immediately_and_clearing_stops_polling() {
        // given
        let calls = Arc::new(AtomicUsize::new(0));
        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, counting_actor(calls.clone(), 7)));
        let (selection_tx, selection_rx) = watch::channel(None);
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);
        let mut balances = sync.subscribe();
        let _handle = sync.spawn();
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // when
        selection_tx.send_replace(Some(Token::Icp));
        balances.changed().await.unwrap();

        // then
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(balances.borrow().amount_for(Token::Icp).is_some());

        // when: the token is cleared
        selection_tx.send_replace(None);
        balances.changed().await.unwrap();

        // then
        assert_eq!(*balances.borrow(), BalanceState::Unknown);
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, counting_actor(calls.clone(), 1)));
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::Icp));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        let handle = sync.spawn();
        settle().await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ends_when_the_selection_owner_goes_away() {
        let (_session_tx, session_rx) = watch::channel(Session::disconnected(None));
        let (selection_tx, selection_rx) = watch::channel(None);
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        let handle = sync.spawn();
        drop(selection_tx);
        settle().await;

        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_before_the_poller_starts_queries_once() {
        // given: the selection moves before the poll task gets to run
        let calls = Arc::new(AtomicUsize::new(0));
        let (_session_tx, session_rx) = watch::channel(connected(Token::Icp, counting_actor(calls.clone(), 5)));
        let (selection_tx, selection_rx) = watch::channel(None);
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);

        // when
        let _handle = sync.spawn();
        selection_tx.send_replace(Some(Token::Icp));
        settle().await;

        // then
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sync.current().amount_for(Token::Icp).is_some());
    }

    #[tokio::test]
    async fn stale_refresh_keeps_the_current_token_balance() {
        // given: ckBTC is selected and known
        let mut icp = MockLedgerActor::new();
        icp.expect_balance_of().returning(|_| Ok(Nat::from(5u64)));
        let mut ckbtc = MockLedgerActor::new();
        ckbtc.expect_balance_of().returning(|_| Ok(Nat::from(777u64)));
        let ledgers = LedgerHandles::new()
            .with(Token::Icp, Arc::new(icp))
            .with(Token::CkBtc, Arc::new(ckbtc));

        let (_session_tx, session_rx) = watch::channel(Session::connected(owner(), ledgers, Some(service())));
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::CkBtc));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);
        sync.refresh(Some(Token::CkBtc)).await;

        // when: a refresh captured for the previous token completes
        sync.refresh(Some(Token::Icp)).await;

        // then
        assert_eq!(
            sync.current().amount_for(Token::CkBtc),
            Some(&TokenAmount::from_units(Token::CkBtc, 777u64))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connecting_an_identity_refreshes_without_waiting_for_a_tick() {
        // given: a token is selected but nobody is connected yet
        let calls = Arc::new(AtomicUsize::new(0));
        let (session_tx, session_rx) = watch::channel(Session::disconnected(Some(service())));
        let (_selection_tx, selection_rx) = watch::channel(Some(Token::Icp));
        let sync = BalanceSynchronizer::new(session_rx, selection_rx, DEFAULT_POLL_INTERVAL);
        let _handle = sync.spawn();
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // when
        session_tx.send_replace(connected(Token::Icp, counting_actor(calls.clone(), 3)));
        settle().await;

        // then
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sync.current().amount_for(Token::Icp),
            Some(&TokenAmount::from_units(Token::Icp, 3u64))
        );
    }
}
