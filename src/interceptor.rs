/// Interceptor Module
///
/// Wraps any [`Executor`] or [`Session`] in an ordered chain of interceptors. Each
/// interceptor is paired with a [`Pointcut`] that decides which calls it sees;
/// calls it does not match pass straight to the next layer. The first
/// registered interceptor is the outermost one.
///
/// Interceptors receive the call description and a [`Next`] continuation.
/// They may inspect or log the call, short-circuit it with their own
/// [`Outcome`], or hand it on with [`Next::proceed`].
use crate::core::{Context, DataError, Result, Value};
use crate::executor::Executor;
use crate::resultset::ResultSet;
use crate::session::Session;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

static MATCH_ALL: Lazy<Regex> = Lazy::new(|| Regex::new(".*").expect("literal pattern"));

/// The executor operation being intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ping,
    Query,
    Execute,
    Begin,
    Commit,
    Rollback,
    Close,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Ping => "Ping",
            Operation::Query => "Query",
            Operation::Execute => "Execute",
            Operation::Begin => "Begin",
            Operation::Commit => "Commit",
            Operation::Rollback => "Rollback",
            Operation::Close => "Close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One executor call as seen by interceptors.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub ctx: &'a Context,
    pub operation: Operation,
    /// Statement text for `Query` and `Execute`
    pub statement: Option<&'a str>,
    pub params: &'a [Value],
    /// `require` for `Commit`/`Rollback`, `rollback` for `Close`
    pub flag: Option<bool>,
}

impl<'a> Call<'a> {
    fn new(ctx: &'a Context, operation: Operation) -> Self {
        Call {
            ctx,
            operation,
            statement: None,
            params: &[],
            flag: None,
        }
    }
}

/// What a call produced.
pub enum Outcome {
    Ping(bool),
    Rows(Box<dyn ResultSet>),
    Done,
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ping(alive) => f.debug_tuple("Ping").field(alive).finish(),
            Outcome::Rows(_) => f.write_str("Rows(..)"),
            Outcome::Done => f.write_str("Done"),
        }
    }
}

enum Matcher {
    Pattern(Regex),
    Predicate(Box<dyn Fn(&Call) -> bool + Send + Sync>),
}

/// Selects the calls an interceptor applies to.
pub struct Pointcut(Matcher);

impl Pointcut {
    /// Matches calls whose operation name matches `pattern`.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(|re| Pointcut(Matcher::Pattern(re)))
            .map_err(|e| DataError::Config(format!("invalid pointcut pattern: {}", e)))
    }

    pub fn all() -> Self {
        Pointcut(Matcher::Pattern(MATCH_ALL.clone()))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Call) -> bool + Send + Sync + 'static,
    {
        Pointcut(Matcher::Predicate(Box::new(f)))
    }

    pub fn matches(&self, call: &Call) -> bool {
        match &self.0 {
            Matcher::Pattern(re) => re.is_match(call.operation.name()),
            Matcher::Predicate(f) => f(call),
        }
    }
}

/// Cross-cutting behaviour around executor calls.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, call: &Call, next: Next) -> Result<Outcome>;
}

struct Layer {
    pointcut: Pointcut,
    interceptor: Arc<dyn Interceptor>,
}

type Target<'a> = dyn Fn(&Call) -> Result<Outcome> + 'a;

/// The rest of the chain after the current interceptor.
pub struct Next<'a> {
    layers: &'a [Layer],
    target: &'a Target<'a>,
}

impl<'a> Next<'a> {
    /// Runs the next matching interceptor, or the wrapped target once the
    /// chain is exhausted.
    pub fn proceed(self, call: &Call) -> Result<Outcome> {
        let mut layers = self.layers;
        while let Some((layer, rest)) = layers.split_first() {
            if layer.pointcut.matches(call) {
                let next = Next {
                    layers: rest,
                    target: self.target,
                };
                return layer.interceptor.intercept(call, next);
            }
            layers = rest;
        }
        (self.target)(call)
    }
}

/// Ordered interceptors shared by the executor and session wrappers.
#[derive(Default)]
struct Chain {
    layers: Vec<Layer>,
}

impl Chain {
    fn push(&mut self, pointcut: Pointcut, interceptor: Arc<dyn Interceptor>) {
        self.layers.push(Layer {
            pointcut,
            interceptor,
        });
    }

    fn run(&self, call: &Call, target: &Target<'_>) -> Result<Outcome> {
        Next {
            layers: &self.layers,
            target,
        }
        .proceed(call)
    }
}

fn dispatch(target: &dyn Executor, call: &Call) -> Result<Outcome> {
    let ctx = call.ctx;
    let statement = call.statement.unwrap_or_default();
    let flag = call.flag.unwrap_or(false);
    match call.operation {
        Operation::Ping => Ok(Outcome::Ping(target.ping(ctx))),
        Operation::Query => target.query(ctx, statement, call.params).map(Outcome::Rows),
        Operation::Execute => target.execute(ctx, statement, call.params).map(Outcome::Rows),
        Operation::Begin => target.begin(ctx).map(|_| Outcome::Done),
        Operation::Commit => target.commit(ctx, flag).map(|_| Outcome::Done),
        Operation::Rollback => target.rollback(ctx, flag).map(|_| Outcome::Done),
        Operation::Close => target.close(ctx, flag).map(|_| Outcome::Done),
    }
}

fn dispatch_session(target: &dyn Session, call: &Call) -> Result<Outcome> {
    let ctx = call.ctx;
    let statement = call.statement.unwrap_or_default();
    match call.operation {
        Operation::Ping => Ok(Outcome::Ping(target.ping(ctx))),
        Operation::Query => target.query(ctx, statement, call.params).map(Outcome::Rows),
        Operation::Execute => target.execute(ctx, statement, call.params).map(Outcome::Rows),
        Operation::Begin => target.begin(ctx).map(|_| Outcome::Done),
        Operation::Commit => target.commit(ctx).map(|_| Outcome::Done),
        Operation::Rollback => target.rollback(ctx).map(|_| Outcome::Done),
        Operation::Close => target.close().map(|_| Outcome::Done),
    }
}

fn rows(outcome: Outcome) -> Result<Box<dyn ResultSet>> {
    match outcome {
        Outcome::Rows(rs) => Ok(rs),
        _ => Err(DataError::Unsupported("interceptor did not produce a result set")),
    }
}

/// Executor decorated with an interceptor chain.
pub struct InterceptedExecutor<E> {
    inner: E,
    chain: Chain,
}

impl<E: Executor> InterceptedExecutor<E> {
    pub fn new(inner: E) -> Self {
        InterceptedExecutor {
            inner,
            chain: Chain::default(),
        }
    }

    /// Appends an interceptor. Earlier ones wrap later ones.
    pub fn with(mut self, pointcut: Pointcut, interceptor: Arc<dyn Interceptor>) -> Self {
        self.chain.push(pointcut, interceptor);
        self
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn run(&self, call: &Call) -> Result<Outcome> {
        self.chain
            .run(call, &|call: &Call| dispatch(&self.inner, call))
    }
}

impl<E: Executor> Executor for InterceptedExecutor<E> {
    fn ping(&self, ctx: &Context) -> bool {
        matches!(
            self.run(&Call::new(ctx, Operation::Ping)),
            Ok(Outcome::Ping(true))
        )
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        let call = Call {
            statement: Some(sql),
            params,
            ..Call::new(ctx, Operation::Query)
        };
        rows(self.run(&call)?)
    }

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        let call = Call {
            statement: Some(sql),
            params,
            ..Call::new(ctx, Operation::Execute)
        };
        rows(self.run(&call)?)
    }

    fn begin(&self, ctx: &Context) -> Result<()> {
        self.run(&Call::new(ctx, Operation::Begin)).map(|_| ())
    }

    fn commit(&self, ctx: &Context, require: bool) -> Result<()> {
        let call = Call {
            flag: Some(require),
            ..Call::new(ctx, Operation::Commit)
        };
        self.run(&call).map(|_| ())
    }

    fn rollback(&self, ctx: &Context, require: bool) -> Result<()> {
        let call = Call {
            flag: Some(require),
            ..Call::new(ctx, Operation::Rollback)
        };
        self.run(&call).map(|_| ())
    }

    fn close(&self, ctx: &Context, rollback: bool) -> Result<()> {
        let call = Call {
            flag: Some(rollback),
            ..Call::new(ctx, Operation::Close)
        };
        self.run(&call).map(|_| ())
    }
}

/// Session decorated with an interceptor chain.
///
/// Calls carry no `flag`: sessions commit and roll back unconditionally.
pub struct InterceptedSession<S> {
    inner: S,
    chain: Chain,
}

impl<S: Session> InterceptedSession<S> {
    pub fn new(inner: S) -> Self {
        InterceptedSession {
            inner,
            chain: Chain::default(),
        }
    }

    /// Appends an interceptor. Earlier ones wrap later ones.
    pub fn with(mut self, pointcut: Pointcut, interceptor: Arc<dyn Interceptor>) -> Self {
        self.chain.push(pointcut, interceptor);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run(&self, call: &Call) -> Result<Outcome> {
        self.chain
            .run(call, &|call: &Call| dispatch_session(&self.inner, call))
    }
}

impl<S: Session> Session for InterceptedSession<S> {
    fn ping(&self, ctx: &Context) -> bool {
        matches!(
            self.run(&Call::new(ctx, Operation::Ping)),
            Ok(Outcome::Ping(true))
        )
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        let call = Call {
            statement: Some(sql),
            params,
            ..Call::new(ctx, Operation::Query)
        };
        rows(self.run(&call)?)
    }

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        let call = Call {
            statement: Some(sql),
            params,
            ..Call::new(ctx, Operation::Execute)
        };
        rows(self.run(&call)?)
    }

    fn begin(&self, ctx: &Context) -> Result<()> {
        self.run(&Call::new(ctx, Operation::Begin)).map(|_| ())
    }

    fn commit(&self, ctx: &Context) -> Result<()> {
        self.run(&Call::new(ctx, Operation::Commit)).map(|_| ())
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        self.run(&Call::new(ctx, Operation::Rollback)).map(|_| ())
    }

    fn close(&self) -> Result<()> {
        let ctx = Context::background();
        self.run(&Call::new(&ctx, Operation::Close)).map(|_| ())
    }
}

/// Logs every call it sees with its duration.
#[derive(Debug, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept(&self, call: &Call, next: Next) -> Result<Outcome> {
        let started = Instant::now();
        let result = next.proceed(call);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => debug!(
                operation = call.operation.name(),
                statement = call.statement.unwrap_or_default(),
                params = call.params.len(),
                elapsed_ms,
                "call finished"
            ),
            Err(e) => warn!(
                operation = call.operation.name(),
                statement = call.statement.unwrap_or_default(),
                elapsed_ms,
                error = %e,
                "call failed"
            ),
        }
        result
    }
}
