//! 编排器：Planner → Worker → Explainer 的线性状态机
//!
//! 每次运行恰好一次规划调用、至多 N 次工具调用（N 为计划长度）、一次解释调用；
//! 没有回退到 PLANNING 的分支，也不在状态机层面重试。事件（若提供通道）按发生顺序推入。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agents::worker::emit;
use crate::agents::{AgentEvent, Explainer, Planner, Worker};
use crate::core::{AgentError, OrchestrationState, RunPhase};
use crate::memory::Message;

/// 编排器：持有三个阶段；同一实例可被多个并发运行共享
pub struct Orchestrator {
    planner: Planner,
    worker: Worker,
    explainer: Explainer,
}

impl Orchestrator {
    pub fn new(planner: Planner, worker: Worker, explainer: Explainer) -> Self {
        Self {
            planner,
            worker,
            explainer,
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn enter(current: &mut RunPhase, phase: RunPhase, events: Option<&mpsc::UnboundedSender<AgentEvent>>) {
        debug_assert!(
            *current == phase || phase == RunPhase::Failed || current.next() == Some(phase),
            "illegal phase transition {:?} -> {:?}",
            current,
            phase
        );
        *current = phase;
        emit(events, AgentEvent::PhaseChanged(phase));
    }

    /// 跑完整个状态机；失败时 state.phase 置为 FAILED 并返回错误
    ///
    /// 有事件通道时 Explainer 走流式并转发 Token。
    pub async fn run(
        &self,
        state: &mut OrchestrationState,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let span = tracing::info_span!("run", run_id = %state.run_id);
        match self.drive(state, events, &cancel).instrument(span).await {
            Ok(()) => {
                Self::enter(&mut state.phase, RunPhase::Done, events);
                Ok(())
            }
            Err(e) => {
                tracing::error!(phase = ?state.phase, "Run failed: {}", e);
                Self::enter(&mut state.phase, RunPhase::Failed, events);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        state: &mut OrchestrationState,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let check = || {
            if cancel.is_cancelled() {
                Err(AgentError::Cancelled)
            } else {
                Ok(())
            }
        };

        tracing::info!("=== PLANNER ===");
        Self::enter(&mut state.phase, RunPhase::Planning, events);
        check()?;
        let plan = self.planner.plan(&state.messages).await?;
        state.current_step = 0;
        state.context_log.clear();
        emit(events, AgentEvent::PlanReady { plan: plan.clone() });
        state.plan = Some(plan);

        tracing::info!("=== WORKER ===");
        Self::enter(&mut state.phase, RunPhase::Working, events);
        check()?;
        let log = std::mem::take(&mut state.context_log);
        let plan = state.plan.as_deref().unwrap_or_default();
        state.context_log = self.worker.execute(plan, log, events, cancel).await?;
        emit(
            events,
            AgentEvent::ContextLog {
                log: state.context_log.clone(),
            },
        );

        tracing::info!("=== EXPLAINER ===");
        Self::enter(&mut state.phase, RunPhase::Explaining, events);
        check()?;
        let answer = self
            .explainer
            .explain(
                &state.messages,
                plan,
                &state.context_log,
                events,
                cancel,
            )
            .await?;
        state.messages.push(Message::assistant(answer.clone()));
        state.final_answer = Some(answer);
        Ok(())
    }
}
