//! Call graph scheduler
//!
//! Runs a request's [`CallDag`] as pure data-flow: a node becomes ready once
//! all of its predecessors are finished, and ready nodes start in the order
//! they became ready. Each node goes through
//!
//! ```text
//! Pending -> Ready -> Started -> ResultReceived -> Finished
//! ```
//!
//! and reaches `Finished` exactly once, even when it never ran. Synchronous
//! replies are settled inline; asynchronous ones complete on spawned tasks
//! and report back over a channel, so all node state is mutated by the
//! request's own task. A single deadline covers the whole request; when it
//! expires every unfinished node is finished with a timeout and late
//! completions are dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::buffer::BufferPool;
use super::codes::{ApiCode, CallState};
use super::context::PipelineContext;
use super::envelope::GatewayResponse;
use super::error::{CallFailure, GatewayError};
use super::invoker::{CallInvoker, ExecutionOutcome};
use super::metadata::CallMetadata;
use super::metrics::{CallOutcome, GatewayMetrics};
use super::node::{CallDag, CallNode, ExecutionId, NodeState};
use crate::plugin::points::{
    CallDisposition, FinishScope, GatewayPlugins, ResponseScope, ResultScope, StartScope,
};
use crate::rpc::{RpcError, UpstreamResult};

type Completed = (ExecutionId, ExecutionOutcome);

/// Bookkeeping for one pass over a call graph
struct Run {
    member: Vec<bool>,
    /// Unfinished predecessors per node
    remaining: Vec<usize>,
    dependents: Vec<Vec<ExecutionId>>,
    ready: VecDeque<ExecutionId>,
    unfinished: usize,
    in_flight: usize,
    /// Cleared once the run is aborted; finishing a node then readies nothing
    propagate: bool,
}

impl Run {
    fn new(dag: &mut CallDag) -> Self {
        let set = dag.execution_set();
        let len = dag.len();
        let mut run = Self {
            member: vec![false; len],
            remaining: vec![0; len],
            dependents: vec![Vec::new(); len],
            ready: VecDeque::new(),
            unfinished: set.len(),
            in_flight: 0,
            propagate: true,
        };

        for &id in &set {
            run.member[id] = true;
            let prev = dag.nodes()[id].prev();
            run.remaining[id] = prev.len();
            for &p in prev {
                run.dependents[p].push(id);
            }
        }
        for &id in &set {
            if run.remaining[id] == 0 {
                run.mark_ready(dag, id);
            }
        }
        run
    }

    fn mark_ready(&mut self, dag: &mut CallDag, id: ExecutionId) {
        if let Some(node) = dag.node_mut(id) {
            node.state = NodeState::Ready;
        }
        self.ready.push_back(id);
    }
}

pub struct WorkflowScheduler {
    plugins: Arc<GatewayPlugins>,
    invoker: CallInvoker,
    buffers: Arc<BufferPool>,
    metrics: Arc<GatewayMetrics>,
    request_timeout: Duration,
}

impl WorkflowScheduler {
    pub fn new(
        plugins: Arc<GatewayPlugins>,
        invoker: CallInvoker,
        buffers: Arc<BufferPool>,
        metrics: Arc<GatewayMetrics>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            plugins,
            invoker,
            buffers,
            metrics,
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Run every call of `dag` and write the response
    ///
    /// The deadline counts from the moment the request context was created.
    pub async fn execute(&self, ctx: &mut PipelineContext, dag: &mut CallDag) -> GatewayResponse {
        let span = ctx.span().clone();
        let deadline = tokio::time::Instant::from_std(ctx.started_at() + self.request_timeout);
        let (tx, mut rx) = mpsc::unbounded_channel::<Completed>();

        let mut run = {
            let _entered = span.enter();
            debug!(calls = dag.len(), "Scheduling call graph");
            Run::new(dag)
        };

        loop {
            {
                let _entered = span.enter();
                while let Some(id) = run.ready.pop_front() {
                    self.start(ctx, dag, &mut run, id, &tx);
                }
                if run.unfinished == 0 {
                    break;
                }
                if run.in_flight == 0 {
                    warn!(unfinished = run.unfinished, "Call graph cannot make progress");
                    self.abort(ctx, dag, &mut run, CallFailure::Deadlock);
                    break;
                }
            }

            tokio::select! {
                Some((id, outcome)) = rx.recv() => {
                    run.in_flight -= 1;
                    let _entered = span.enter();
                    self.settle(ctx, dag, &mut run, id, outcome);
                }
                () = tokio::time::sleep_until(deadline) => {
                    let _entered = span.enter();
                    let after_ms = self.request_timeout.as_millis() as u64;
                    warn!(after_ms, unfinished = run.unfinished, "Request deadline expired");
                    self.abort(ctx, dag, &mut run, CallFailure::Timeout { after_ms });
                    break;
                }
            }
        }
        drop(rx);

        let failed = dag.nodes().iter().filter(|n| n.failure().is_some()).count();
        let response = {
            let _entered = span.enter();
            self.complete(ctx, Some(dag), None)
        };
        self.metrics.record_request(ctx.elapsed(), failed);
        response
    }

    /// Answer a request that failed before any call could run
    pub fn reject(&self, ctx: &PipelineContext, origin: &GatewayError) -> GatewayResponse {
        let response = {
            let _entered = ctx.span().enter();
            self.complete(ctx, None, Some(origin))
        };
        self.metrics.record_rejection(ctx.elapsed());
        response
    }

    fn start(
        &self,
        ctx: &mut PipelineContext,
        dag: &mut CallDag,
        run: &mut Run,
        id: ExecutionId,
        tx: &mpsc::UnboundedSender<Completed>,
    ) {
        if let Some((upstream, cause)) = first_failed_prev(dag, id) {
            self.finish(ctx, dag, run, id, Some(CallFailure::dependent(upstream, cause)));
            return;
        }

        if let Some(node) = dag.node_mut(id) {
            node.state = NodeState::Started;
            node.timing.started_at = Some(Instant::now());
        }
        let Some(node) = dag.node(id) else {
            return;
        };

        let disposition = self.plugins.start_call(StartScope { cid: ctx.cid(), node });
        match disposition {
            Err(failure) => self.finish(ctx, dag, run, id, Some(failure)),
            Ok(CallDisposition::Resolved(value)) => {
                debug!(call = node.key(), "Call resolved without dispatch");
                self.receive(ctx, dag, run, id, value, CallMetadata::default());
            }
            Ok(CallDisposition::Dispatch) => {
                let upstream = upstream_results(dag, node);
                match self.invoker.invoke(ctx.cid(), node, upstream) {
                    ExecutionOutcome::Pending(pending) => {
                        run.in_flight += 1;
                        let completion = self.invoker.complete(pending, ctx.span().clone());
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let outcome = completion.await;
                            // The receiver is gone once the request has been answered
                            let _ = tx.send((id, outcome));
                        });
                    }
                    outcome => self.settle(ctx, dag, run, id, outcome),
                }
            }
        }
    }

    fn settle(
        &self,
        ctx: &mut PipelineContext,
        dag: &mut CallDag,
        run: &mut Run,
        id: ExecutionId,
        outcome: ExecutionOutcome,
    ) {
        if dag.node(id).is_none_or(CallNode::is_finished) {
            debug!(id, "Dropping completion of a finished call");
            return;
        }
        match outcome {
            ExecutionOutcome::Success { value, metadata } => {
                self.receive(ctx, dag, run, id, value, metadata)
            }
            ExecutionOutcome::Failure { cause, metadata } => {
                ctx.metadata.merge(metadata);
                self.finish(ctx, dag, run, id, Some(cause));
            }
            ExecutionOutcome::Pending(_) => {
                let failure = CallFailure::Execution(RpcError::transport(
                    "completion yielded another pending call",
                ));
                self.finish(ctx, dag, run, id, Some(failure));
            }
        }
    }

    fn receive(
        &self,
        ctx: &mut PipelineContext,
        dag: &mut CallDag,
        run: &mut Run,
        id: ExecutionId,
        value: Value,
        metadata: CallMetadata,
    ) {
        ctx.metadata.merge(metadata);
        if let Some(node) = dag.node_mut(id) {
            node.state = NodeState::ResultReceived;
        }
        let Some(node) = dag.node(id) else {
            return;
        };

        let (result, scope) = self.plugins.receive_result(ResultScope {
            cid: ctx.cid(),
            node,
            value: &value,
            buffer: None,
            pooled: false,
        });
        let (buffer, pooled) = (scope.buffer, scope.pooled);

        let failure = match result {
            Ok(()) => {
                if let Some(node) = dag.node_mut(id) {
                    node.buffer = buffer;
                    node.from_client = pooled;
                    node.value = Some(value);
                }
                None
            }
            Err(failure) => {
                if let Some(buffer) = buffer.filter(|_| pooled) {
                    self.buffers.release(buffer);
                }
                Some(failure)
            }
        };
        self.finish(ctx, dag, run, id, failure);
    }

    /// Drive a node to `Finished`; a no-op for nodes already there
    fn finish(
        &self,
        ctx: &PipelineContext,
        dag: &mut CallDag,
        run: &mut Run,
        id: ExecutionId,
        failure: Option<CallFailure>,
    ) {
        match dag.node_mut(id) {
            Some(node) if !node.is_finished() => {
                node.timing.finished_at = Some(Instant::now());
                node.failure = failure;
            }
            _ => return,
        }
        let Some(node) = dag.node(id) else {
            return;
        };

        let elapsed = node.timing().elapsed();
        let state = self
            .plugins
            .finish_call(FinishScope {
                cid: ctx.cid(),
                node,
                failure: node.failure(),
                elapsed,
            })
            .unwrap_or_else(|err| {
                error!(call = node.key(), error = %err, "call.finished chain failed");
                CallState::from_code(ApiCode::UNKNOWN_ERROR)
            });

        let outcome = match node.failure() {
            None => CallOutcome::Success,
            Some(f) if f.is_inherited() => CallOutcome::Skipped,
            Some(f) if f.is_timeout() => CallOutcome::Timeout,
            Some(_) => CallOutcome::Failure,
        };
        self.metrics.record_call(node.method_name(), elapsed, outcome);

        if let Some(node) = dag.node_mut(id) {
            node.call_state = Some(state);
            node.state = NodeState::Finished;
        }
        run.unfinished = run.unfinished.saturating_sub(1);

        if run.propagate {
            for &dependent in &run.dependents[id] {
                run.remaining[dependent] -= 1;
                if run.remaining[dependent] == 0 {
                    if let Some(node) = dag.node_mut(dependent) {
                        node.state = NodeState::Ready;
                    }
                    run.ready.push_back(dependent);
                }
            }
        }
    }

    /// Finish every remaining node with `failure`
    fn abort(&self, ctx: &PipelineContext, dag: &mut CallDag, run: &mut Run, failure: CallFailure) {
        run.propagate = false;
        run.ready.clear();
        for id in 0..run.member.len() {
            if run.member[id] {
                self.finish(ctx, dag, run, id, Some(failure.clone()));
            }
        }
    }

    /// Terminal step: write the response, then hand pooled buffers back
    fn complete(
        &self,
        ctx: &PipelineContext,
        dag: Option<&mut CallDag>,
        origin: Option<&GatewayError>,
    ) -> GatewayResponse {
        let response = self
            .plugins
            .finish_request(ResponseScope {
                ctx,
                dag: dag.as_deref(),
                origin,
            })
            .unwrap_or_else(|err| {
                error!(error = %err, "request.finished chain failed");
                GatewayResponse::internal_error(ctx.cid(), &err)
            });

        if let Some(dag) = dag {
            for node in dag.nodes_mut() {
                if let Some(buffer) = node.buffer.take() {
                    if node.from_client {
                        self.buffers.release(buffer);
                    }
                }
                node.from_client = false;
            }
        }
        response
    }
}

/// First failed predecessor in `prev` order, with its failure
fn first_failed_prev(dag: &CallDag, id: ExecutionId) -> Option<(String, CallFailure)> {
    let node = dag.node(id)?;
    node.prev().iter().find_map(|p| {
        let prev = dag.node(*p)?;
        prev.failure().map(|f| (prev.key().to_string(), f.clone()))
    })
}

fn upstream_results(dag: &CallDag, node: &CallNode) -> Vec<UpstreamResult> {
    node.prev()
        .iter()
        .filter_map(|p| dag.node(*p))
        .filter_map(|prev| {
            prev.value().map(|value| UpstreamResult {
                key: prev.key().to_string(),
                value: value.clone(),
            })
        })
        .collect()
}
