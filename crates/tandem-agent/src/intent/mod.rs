//! Intent resolution.
//!
//! Decides, for one utterance, whether the turn needs tools and which calls
//! to make.  Two [`Planner`]s are tried in order:
//!
//! 1. [`RemotePlanner`] -- asks the reasoning service for a JSON plan.
//! 2. [`HeuristicPlanner`] -- deterministic keyword rules, no network.
//!
//! [`IntentResolver::resolve`] never fails: if the remote stage errors for
//! any reason the heuristic answer is used.

pub mod heuristic;
pub mod mode;
pub mod remote;

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::history::ConversationTurn;
use crate::tools::{FunctionDeclaration, ToolCall, ToolCallPlan};

pub use heuristic::HeuristicPlanner;
pub use mode::ModeSelector;
pub use remote::RemotePlanner;

/// Which stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Remote,
    Heuristic,
}

/// Outcome of intent resolution for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub needs_tools: bool,
    pub tool_calls: ToolCallPlan,
    pub source: DecisionSource,
}

impl Decision {
    /// No tools; answer conversationally.
    pub fn conversational(source: DecisionSource) -> Self {
        Self {
            needs_tools: false,
            tool_calls: Vec::new(),
            source,
        }
    }

    pub fn with_tools(tool_calls: Vec<ToolCall>, source: DecisionSource) -> Self {
        Self {
            needs_tools: !tool_calls.is_empty(),
            tool_calls,
            source,
        }
    }
}

/// Everything a planner may look at.
#[derive(Debug, Clone, Copy)]
pub struct PlanningContext<'a> {
    pub utterance: &'a str,
    /// Most recent curated turns, oldest first.
    pub recent: &'a [ConversationTurn],
    pub working_dir: &'a Path,
    pub declarations: &'a [FunctionDeclaration],
}

/// One planning stage.
#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn plan(&self, ctx: &PlanningContext<'_>) -> Result<Decision>;
}

/// Remote-then-heuristic resolver.
pub struct IntentResolver {
    primary: Option<Box<dyn Planner>>,
    fallback: HeuristicPlanner,
}

impl IntentResolver {
    pub fn new(primary: Box<dyn Planner>) -> Self {
        Self {
            primary: Some(primary),
            fallback: HeuristicPlanner::new(),
        }
    }

    /// Resolver that only runs the heuristic stage.
    pub fn heuristic_only() -> Self {
        Self {
            primary: None,
            fallback: HeuristicPlanner::new(),
        }
    }

    /// Resolve an utterance.  Always produces a decision.
    pub async fn resolve(&self, ctx: &PlanningContext<'_>) -> Decision {
        if let Some(primary) = &self.primary {
            match primary.plan(ctx).await {
                Ok(decision) => {
                    info!(
                        planner = primary.name(),
                        needs_tools = decision.needs_tools,
                        calls = decision.tool_calls.len(),
                        "intent resolved"
                    );
                    return decision;
                }
                Err(e) => {
                    warn!(planner = primary.name(), error = %e, "planner failed, using heuristics");
                }
            }
        }

        let decision = self.fallback.decide(ctx);
        debug!(
            needs_tools = decision.needs_tools,
            calls = decision.tool_calls.len(),
            "heuristic decision"
        );
        decision
    }
}

impl std::fmt::Debug for IntentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentResolver")
            .field("primary", &self.primary.as_ref().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::error::AgentError;
    use crate::tools::WRITE_FILE;

    struct Failing;

    #[async_trait]
    impl Planner for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn plan(&self, _ctx: &PlanningContext<'_>) -> Result<Decision> {
            Err(AgentError::Planning {
                reason: "service down".into(),
            })
        }
    }

    struct Fixed(Decision);

    #[async_trait]
    impl Planner for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn plan(&self, _ctx: &PlanningContext<'_>) -> Result<Decision> {
            Ok(self.0.clone())
        }
    }

    fn ctx<'a>(utterance: &'a str, dir: &'a Path) -> PlanningContext<'a> {
        PlanningContext {
            utterance,
            recent: &[],
            working_dir: dir,
            declarations: &[],
        }
    }

    #[tokio::test]
    async fn failing_primary_falls_back_to_heuristics() {
        let dir = PathBuf::from(".");
        let resolver = IntentResolver::new(Box::new(Failing));
        let decision = resolver
            .resolve(&ctx("write a golang hello world server", &dir))
            .await;

        assert_eq!(decision.source, DecisionSource::Heuristic);
        assert_eq!(decision.tool_calls.len(), 1);
        assert_eq!(decision.tool_calls[0].name, WRITE_FILE);
    }

    #[tokio::test]
    async fn successful_primary_wins() {
        let dir = PathBuf::from(".");
        let resolver = IntentResolver::new(Box::new(Fixed(Decision::conversational(
            DecisionSource::Remote,
        ))));
        let decision = resolver
            .resolve(&ctx("write a golang hello world server", &dir))
            .await;

        assert_eq!(decision.source, DecisionSource::Remote);
        assert!(!decision.needs_tools);
    }

    #[tokio::test]
    async fn heuristic_only_resolver_chats_by_default() {
        let dir = PathBuf::from(".");
        let decision = IntentResolver::heuristic_only()
            .resolve(&ctx("what is the capital of France?", &dir))
            .await;
        assert!(!decision.needs_tools);
        assert!(decision.tool_calls.is_empty());
    }
}
