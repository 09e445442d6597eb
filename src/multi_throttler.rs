//! # Multi-Rule Throttler
//!
//! This module implements the core scheduling engine: a token-bucket
//! throttler that enforces several rate-limit rules simultaneously while
//! preserving strict FIFO admission order.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         MultiThrottler                             │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  throttle(cost) ──▶ validate ids ──▶ check queue cap ──▶ enqueue   │
//! │                                                             │      │
//! │  ┌───────────────────┐      ┌───────────────────────────┐   │      │
//! │  │    Rule table     │      │      Admission queue      │◀──┘      │
//! │  │  HashMap<id,Rule> │      │  VecDeque<QueueItem>      │          │
//! │  │                   │      │  (waiter, cost, enqueued) │          │
//! │  └───────────────────┘      └───────────────────────────┘          │
//! │            ▲                              │ head only              │
//! │            │ refill / debit               ▼                        │
//! │  ┌──────────────────────────────────────────────────────┐          │
//! │  │                     Driver task                      │          │
//! │  │  1. elapsed = now − last_tick (monotonic)            │          │
//! │  │  2. every rule: tokens += refill_rate · elapsed      │          │
//! │  │  3. admit head while all its rules have tokens;      │          │
//! │  │     debit, resume waiter, yield every 10 admissions  │          │
//! │  │  4. else sleep min(head wait, config.delay)          │          │
//! │  │  5. stop when the queue is empty                     │          │
//! │  └──────────────────────────────────────────────────────┘          │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! FIFO is strict with respect to admission: a head that cannot yet be
//! admitted blocks all followers even if their cost vectors could be
//! satisfied immediately. This keeps cheap requests from starving
//! expensive ones.
//!
//! ## Driver Lifecycle
//!
//! The driver is a single spawned task, alive only while the queue is
//! non-empty. The first `throttle` call on an idle throttler starts it;
//! it stops itself after draining the queue, and the next `throttle`
//! starts a fresh one. Tokens keep accruing while the driver is stopped:
//! the first tick after a restart credits the whole idle gap.
//!
//! ## Cancellation
//!
//! Dropping an unresolved [`Admission`] cancels the request. A cancelled
//! head is popped without debiting any tokens and counts as driver
//! progress, so a cancelled head can never wedge the queue.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::config::MultiThrottlerConfig;
use crate::cost::CostVector;
use crate::error::{Result, ThrottleError};
use crate::rule::{RuleStatus, ThrottleRule};

/// Multi-rule token-bucket throttler with a FIFO admission queue.
///
/// Each instance owns its rule table and queue. Cloning is cheap and
/// produces another handle to the same throttler, so one instance can be
/// shared across tasks.
///
/// # Example
///
/// ```rust,no_run
/// use ratekeeper::cost::CostVector;
/// use ratekeeper::multi_throttler::MultiThrottler;
/// use ratekeeper::rule::ThrottleRule;
///
/// # async fn example() -> ratekeeper::Result<()> {
/// let throttler = MultiThrottler::new(&[
///     // 1200 weight units per minute
///     ThrottleRule::new("weight", 1200.0, 0.02),
///     // 50 orders per 10 seconds
///     ThrottleRule::new("orders", 50.0, 0.005),
/// ])?;
///
/// // Wait until both budgets can cover this request, then proceed.
/// throttler
///     .throttle(CostVector::from([("weight", 5.0), ("orders", 1.0)]))?
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MultiThrottler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MultiThrottler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiThrottler").finish_non_exhaustive()
    }
}

struct Inner {
    config: MultiThrottlerConfig,
    state: Mutex<State>,
}

struct State {
    rules: HashMap<String, ThrottleRule>,
    queue: VecDeque<QueueItem>,
    running: bool,
    last_tick: Instant,
}

struct QueueItem {
    waiter: oneshot::Sender<Result<()>>,
    cost: CostVector,
    enqueued_at: Instant,
}

/// Completion handle returned by [`MultiThrottler::throttle`].
///
/// Resolves with `Ok(())` once the request has been admitted and its
/// tokens debited, or with the admission error that drained the queue.
/// Dropping it before resolution cancels the request.
#[derive(Debug)]
pub struct Admission {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for Admission {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(ThrottleError::Internal(
                "driver went away before admission".to_string(),
            )),
        })
    }
}

impl MultiThrottler {
    /// Create a throttler with the default configuration.
    ///
    /// Every rule is validated and cloned into an owned table keyed by id;
    /// the caller's rules are not retained. A duplicate id keeps the last
    /// occurrence.
    pub fn new(rules: &[ThrottleRule]) -> Result<Self> {
        Self::with_config(rules, MultiThrottlerConfig::default())
    }

    /// Create a throttler with an explicit configuration.
    pub fn with_config(rules: &[ThrottleRule], config: MultiThrottlerConfig) -> Result<Self> {
        config.validate()?;
        let mut table = HashMap::with_capacity(rules.len());
        for rule in rules {
            rule.validate()?;
            table.insert(rule.id.clone(), rule.clone());
        }
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    rules: table,
                    queue: VecDeque::new(),
                    running: false,
                    last_tick: Instant::now(),
                }),
            }),
        })
    }

    /// Submit a request for admission.
    ///
    /// Fails synchronously with [`ThrottleError::UnknownRule`] if any cost
    /// entry names an unregistered rule, or [`ThrottleError::QueueFull`] if
    /// the queue is at capacity. Otherwise the request is enqueued and the
    /// returned [`Admission`] resolves once all referenced buckets could
    /// cover the cost and the tokens were debited.
    ///
    /// An empty cost vector is legal: it queues in FIFO order like any
    /// other request but consumes nothing when admitted.
    ///
    /// Must be called within a Tokio runtime; the first submission on an
    /// idle throttler spawns the driver task.
    pub fn throttle(&self, cost: CostVector) -> Result<Admission> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.lock()?;
        for (id, _) in cost.iter() {
            if !state.rules.contains_key(id) {
                return Err(state.unknown_rule(id));
            }
        }
        if state.queue.len() >= self.inner.config.max_capacity {
            warn!(
                max_capacity = self.inner.config.max_capacity,
                "admission queue full, rejecting request"
            );
            return Err(ThrottleError::QueueFull {
                max_capacity: self.inner.config.max_capacity,
            });
        }
        state.queue.push_back(QueueItem {
            waiter: tx,
            cost,
            enqueued_at: Instant::now(),
        });
        trace!(queue_length = state.queue.len(), "request enqueued");
        if !state.running {
            state.running = true;
            debug!("driver started");
            tokio::spawn(drive(Arc::clone(&self.inner)));
        }
        Ok(Admission { rx })
    }

    /// Add or update a rule.
    ///
    /// The rule is validated and cloned; the caller's object is not
    /// retained, so later mutations of it cannot corrupt the bucket.
    pub fn add_rule(&self, rule: &ThrottleRule) -> Result<()> {
        rule.validate()?;
        let mut state = self.inner.lock()?;
        debug!(rule = %rule.id, "rule upserted");
        state.rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    /// Remove a rule, returning whether it existed.
    ///
    /// Requests already queued with a cost entry for the removed rule fail
    /// at their admission check: the driver drains the entire queue with
    /// [`ThrottleError::UnknownRule`] and stops.
    pub fn remove_rule(&self, id: &str) -> Result<bool> {
        let mut state = self.inner.lock()?;
        let removed = state.rules.remove(id).is_some();
        if removed {
            debug!(rule = %id, "rule removed");
        }
        Ok(removed)
    }

    /// Set a rule's token balance, clamped into `[0, capacity]`.
    ///
    /// Useful for syncing the local bucket with quota headers returned by
    /// the remote service.
    pub fn set_tokens(&self, id: &str, tokens: f64) -> Result<()> {
        if !tokens.is_finite() {
            return Err(ThrottleError::Validation(format!(
                "token balance must be finite, got {tokens}"
            )));
        }
        let mut state = self.inner.lock()?;
        match state.rules.get_mut(id) {
            Some(rule) => {
                rule.tokens = tokens.clamp(0.0, rule.capacity);
                Ok(())
            }
            None => Err(state.unknown_rule(id)),
        }
    }

    /// Restore every rule to a full bucket.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.inner.lock()?;
        for rule in state.rules.values_mut() {
            rule.tokens = rule.capacity;
        }
        Ok(())
    }

    /// Snapshot of every rule's bucket, refreshed to the current instant.
    pub fn status(&self) -> Result<HashMap<String, RuleStatus>> {
        let mut state = self.inner.lock()?;
        state.tick_refill(Instant::now());
        Ok(state
            .rules
            .iter()
            .map(|(id, rule)| (id.clone(), rule.status()))
            .collect())
    }

    /// A clone of the live rule with the given id, if registered.
    pub fn rule(&self, id: &str) -> Result<Option<ThrottleRule>> {
        Ok(self.inner.lock()?.rules.get(id).cloned())
    }

    /// Number of requests currently queued.
    pub fn queue_length(&self) -> Result<usize> {
        Ok(self.inner.lock()?.queue.len())
    }

    /// Whether the driver task is currently alive.
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.inner.lock()?.running)
    }
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ThrottleError::Internal("throttler state lock poisoned".to_string()))
    }
}

impl State {
    /// Credit every rule with tokens for the time elapsed since the last
    /// tick. The clock is monotonic, so elapsed time is never negative.
    fn tick_refill(&mut self, now: Instant) {
        let elapsed_ms = now
            .saturating_duration_since(self.last_tick)
            .as_secs_f64()
            * 1000.0;
        self.last_tick = now;
        if elapsed_ms <= 0.0 {
            return;
        }
        for rule in self.rules.values_mut() {
            rule.tokens = (rule.tokens + rule.refill_rate * elapsed_ms).min(rule.capacity);
        }
    }

    /// Whether every rule named by `cost` can cover its share right now.
    fn admissible(&self, cost: &CostVector) -> Result<bool> {
        for (id, amount) in cost.iter() {
            match self.rules.get(id) {
                None => return Err(self.unknown_rule(id)),
                Some(rule) if rule.tokens < amount => return Ok(false),
                Some(_) => {}
            }
        }
        Ok(true)
    }

    fn debit(&mut self, cost: &CostVector) {
        for (id, amount) in cost.iter() {
            if let Some(rule) = self.rules.get_mut(id) {
                rule.tokens -= amount;
            }
        }
    }

    /// Minimum time until the head request could be admitted: the largest
    /// per-rule deficit divided by that rule's refill rate.
    fn wait_for_head(&self) -> Duration {
        let Some(head) = self.queue.front() else {
            return Duration::ZERO;
        };
        let mut wait_ms: f64 = 0.0;
        for (id, amount) in head.cost.iter() {
            if let Some(rule) = self.rules.get(id) {
                if rule.tokens < amount {
                    wait_ms = wait_ms.max((amount - rule.tokens) / rule.refill_rate);
                }
            }
        }
        // Cap at 24h so extreme deficits stay within Duration range.
        Duration::from_secs_f64(wait_ms.min(86_400_000.0) / 1000.0)
    }

    fn unknown_rule(&self, id: &str) -> ThrottleError {
        let mut known: Vec<String> = self.rules.keys().cloned().collect();
        known.sort();
        ThrottleError::UnknownRule {
            id: id.to_string(),
            known,
        }
    }
}

/// What the driver should do after releasing the state lock.
enum Step {
    Stop,
    Yield,
    Sleep(Duration),
}

/// Outcome of inspecting the queue head under the lock.
enum Head {
    Empty,
    Cancelled,
    Admit,
    Blocked,
    Abort(ThrottleError),
}

async fn drive(inner: Arc<Inner>) {
    loop {
        let step = match inner.lock() {
            Ok(mut state) => run_tick(&mut state, &inner.config),
            Err(err) => {
                error!(%err, "driver stopping");
                return;
            }
        };
        match step {
            Step::Stop => return,
            Step::Yield => tokio::task::yield_now().await,
            Step::Sleep(pause) => tokio::time::sleep(pause).await,
        }
    }
}

/// One driver iteration: refill, then admit from the head until it blocks.
///
/// All suspension happens in [`drive`] with the lock released; this
/// function only decides what kind of suspension comes next.
fn run_tick(state: &mut State, config: &MultiThrottlerConfig) -> Step {
    state.tick_refill(Instant::now());

    let mut processed = 0usize;
    loop {
        let head = match state.queue.front() {
            None => Head::Empty,
            Some(item) if item.waiter.is_closed() => Head::Cancelled,
            Some(item) => match state.admissible(&item.cost) {
                Ok(true) => Head::Admit,
                Ok(false) => Head::Blocked,
                Err(err) => Head::Abort(err),
            },
        };
        match head {
            Head::Empty => {
                state.running = false;
                debug!("driver stopped: queue drained");
                return Step::Stop;
            }
            Head::Cancelled => {
                // Popped without debiting; still counts as progress.
                state.queue.pop_front();
                processed += 1;
                trace!("cancelled request discarded");
            }
            Head::Admit => {
                if let Some(item) = state.queue.pop_front() {
                    state.debit(&item.cost);
                    trace!(
                        queued_ms = item.enqueued_at.elapsed().as_millis() as u64,
                        "request admitted"
                    );
                    let _ = item.waiter.send(Ok(()));
                    processed += 1;
                }
            }
            Head::Blocked => {
                if processed > 0 {
                    // Progress was made this tick; re-check after a yield
                    // instead of sleeping on a freshly refilled table.
                    return Step::Yield;
                }
                let wait = state.wait_for_head();
                return Step::Sleep(wait.min(config.delay));
            }
            Head::Abort(err) => {
                error!(%err, drained = state.queue.len(), "admission failed, draining queue");
                while let Some(item) = state.queue.pop_front() {
                    let _ = item.waiter.send(Err(err.clone()));
                }
                state.running = false;
                return Step::Stop;
            }
        }
        if processed % 10 == 0 && !state.queue.is_empty() {
            return Step::Yield;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cost(id: &str) -> CostVector {
        CostVector::from([(id, 1.0)])
    }

    #[tokio::test]
    async fn unknown_rule_fails_at_entry() {
        let throttler = MultiThrottler::new(&[ThrottleRule::new("weight", 10.0, 0.01)]).unwrap();
        let err = throttler.throttle(unit_cost("orders")).unwrap_err();
        match err {
            ThrottleError::UnknownRule { id, known } => {
                assert_eq!(id, "orders");
                assert_eq!(known, vec!["weight".to_string()]);
            }
            other => panic!("expected UnknownRule, got {other:?}"),
        }
        assert_eq!(throttler.queue_length().unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_rule_refused_at_construction() {
        let err = MultiThrottler::new(&[ThrottleRule::new("w", 10.0, 0.0)]).unwrap_err();
        assert!(matches!(err, ThrottleError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_cost_admits_without_consuming() {
        let throttler = MultiThrottler::new(&[
            ThrottleRule::new("weight", 10.0, 0.01).with_tokens(4.0)
        ])
        .unwrap();
        throttler.throttle(CostVector::new()).unwrap().await.unwrap();
        let status = throttler.status().unwrap();
        assert!((status["weight"].tokens - 4.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn set_tokens_clamps_into_range() {
        let throttler = MultiThrottler::new(&[ThrottleRule::new("weight", 10.0, 0.01)]).unwrap();

        throttler.set_tokens("weight", 25.0).unwrap();
        assert_eq!(throttler.rule("weight").unwrap().unwrap().tokens, 10.0);

        throttler.set_tokens("weight", -3.0).unwrap();
        assert_eq!(throttler.rule("weight").unwrap().unwrap().tokens, 0.0);

        assert!(matches!(
            throttler.set_tokens("missing", 1.0),
            Err(ThrottleError::UnknownRule { .. })
        ));
        assert!(matches!(
            throttler.set_tokens("weight", f64::NAN),
            Err(ThrottleError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let throttler = MultiThrottler::new(&[
            ThrottleRule::new("a", 10.0, 0.01).with_tokens(1.0),
            ThrottleRule::new("b", 5.0, 0.01).with_tokens(0.0),
        ])
        .unwrap();

        throttler.reset().unwrap();
        throttler.reset().unwrap();

        assert_eq!(throttler.rule("a").unwrap().unwrap().tokens, 10.0);
        assert_eq!(throttler.rule("b").unwrap().unwrap().tokens, 5.0);
    }

    #[tokio::test]
    async fn add_rule_clones_the_input() {
        let throttler = MultiThrottler::new(&[]).unwrap();
        let mut rule = ThrottleRule::new("weight", 10.0, 0.01);
        throttler.add_rule(&rule).unwrap();

        // Mutating the caller's copy must not reach the owned table.
        rule.tokens = -100.0;
        assert_eq!(throttler.rule("weight").unwrap().unwrap().tokens, 10.0);
    }

    #[tokio::test]
    async fn remove_rule_reports_existence() {
        let throttler = MultiThrottler::new(&[ThrottleRule::new("weight", 10.0, 0.01)]).unwrap();
        assert!(throttler.remove_rule("weight").unwrap());
        assert!(!throttler.remove_rule("weight").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_accrue_while_driver_is_stopped() {
        let throttler = MultiThrottler::new(&[ThrottleRule::new("weight", 10.0, 0.001)]).unwrap();
        throttler.set_tokens("weight", 0.0).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;

        let status = throttler.status().unwrap();
        assert!((status["weight"].tokens - 3.0).abs() < 0.1);

        // The accrued balance is immediately spendable on restart.
        let start = Instant::now();
        throttler.throttle(unit_cost("weight")).unwrap().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reflects_refill_over_time() {
        let throttler = MultiThrottler::new(&[ThrottleRule::new("weight", 10.0, 0.001)]).unwrap();
        throttler.set_tokens("weight", 0.0).unwrap();

        let status = throttler.status().unwrap();
        assert!(status["weight"].tokens < 0.1);
        assert!(status["weight"].utilization > 0.99);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let status = throttler.status().unwrap();
        assert!((status["weight"].tokens - 5.0).abs() < 0.1);
        assert!((status["weight"].utilization - 0.5).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn admission_stays_pending_until_tokens_refill() {
        use tokio_test::{assert_pending, assert_ready};

        let throttler =
            MultiThrottler::new(&[ThrottleRule::new("w", 1.0, 0.001).with_tokens(0.0)]).unwrap();
        let mut admission = tokio_test::task::spawn(throttler.throttle(unit_cost("w")).unwrap());

        assert_pending!(admission.poll());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_ready!(admission.poll()).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn driver_stops_when_queue_empties() {
        let throttler = MultiThrottler::new(&[ThrottleRule::new("weight", 10.0, 0.001)]).unwrap();
        assert!(!throttler.is_running().unwrap());

        throttler.throttle(unit_cost("weight")).unwrap().await.unwrap();
        // Give the driver its final tick to observe the empty queue.
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(!throttler.is_running().unwrap());
        assert_eq!(throttler.queue_length().unwrap(), 0);
    }
}
