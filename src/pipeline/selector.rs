//! 流水线选择：意图 + 请求文本 -> 执行策略与步骤

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use super::intent::Intent;
use crate::agents::{AgentKind, AgentRef, AgentRegistry};

/// 综合多个智能体输出时使用的智能体
pub const SYNTHESIZER: AgentKind = AgentKind::Blueprint;

/// 执行策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Parallel,
    Sequence,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Parallel => write!(f, "parallel"),
            Strategy::Sequence => write!(f, "sequence"),
        }
    }
}

/// 与注册表无关的流水线方案
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub strategy: Strategy,
    pub steps: Vec<AgentKind>,
    pub requires_synthesis: bool,
}

impl PipelinePlan {
    /// 意图对应的静态方案
    pub fn for_intent(intent: Intent) -> Self {
        use AgentKind::*;
        let (strategy, steps, requires_synthesis) = match intent {
            Intent::Impact => (Strategy::Parallel, vec![Understanding, Impact], true),
            Intent::Blueprint => (
                Strategy::Sequence,
                vec![Understanding, Impact, Blueprint],
                false,
            ),
            Intent::Documentation => (Strategy::Sequence, vec![Documentation], false),
            Intent::Understanding => (Strategy::Sequence, vec![Understanding], false),
            Intent::Generic => (Strategy::Parallel, vec![Understanding], false),
        };
        Self {
            strategy,
            steps,
            requires_synthesis,
        }
    }

    /// 影响评估 + 文档的固定方案
    pub fn impact_documentation() -> Self {
        Self {
            strategy: Strategy::Sequence,
            steps: vec![
                AgentKind::Understanding,
                AgentKind::Impact,
                AgentKind::Documentation,
            ],
            requires_synthesis: false,
        }
    }

    /// 查表后应用文本覆盖规则，覆盖规则优先
    pub fn select(intent: Intent, query: &str) -> Self {
        if requests_impact_documentation(query) {
            Self::impact_documentation()
        } else {
            Self::for_intent(intent)
        }
    }
}

/// 请求是否要求生成影响评估文档
pub fn requests_impact_documentation(query: &str) -> bool {
    let q = query.to_lowercase();
    q.contains("impact assessment")
        || (q.contains("impact") && q.contains("document"))
        || (q.contains("generate") && q.contains("impact"))
}

/// 解析到具体处理器的流水线
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub strategy: Strategy,
    pub steps: Vec<AgentRef>,
    pub requires_synthesis: bool,
    pub synthesizer: Option<AgentRef>,
}

impl PipelineDescriptor {
    pub fn resolve(plan: &PipelinePlan, registry: &AgentRegistry) -> Result<Self> {
        let steps = plan
            .steps
            .iter()
            .map(|kind| {
                registry
                    .get(*kind)
                    .ok_or_else(|| anyhow!("No handler registered for {}", kind))
            })
            .collect::<Result<Vec<_>>>()?;

        let synthesizer = if plan.requires_synthesis {
            Some(
                registry
                    .get(SYNTHESIZER)
                    .ok_or_else(|| anyhow!("No synthesizer registered ({})", SYNTHESIZER))?,
            )
        } else {
            None
        };

        Ok(Self {
            strategy: plan.strategy,
            steps,
            requires_synthesis: plan.requires_synthesis,
            synthesizer,
        })
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.display_name.clone()).collect()
    }

    /// 逗号拼接的步骤名称，用于持久化
    pub fn joined_names(&self) -> String {
        self.step_names().join(",")
    }
}

/// 基于注册表的流水线选择器
#[derive(Clone)]
pub struct PipelineSelector {
    registry: AgentRegistry,
}

impl PipelineSelector {
    pub fn new(registry: AgentRegistry) -> Self {
        Self { registry }
    }

    pub fn select(&self, intent: Intent, query: &str) -> Result<PipelineDescriptor> {
        PipelineDescriptor::resolve(&PipelinePlan::select(intent, query), &self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentError, AgentHandler};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl AgentHandler for Noop {
        async fn generate(&self, _q: &str, _c: Option<&str>) -> Result<String, AgentError> {
            Ok(String::new())
        }
    }

    fn full_registry() -> AgentRegistry {
        AgentKind::all()
            .into_iter()
            .fold(AgentRegistry::new(), |r, kind| r.with_handler(kind, Arc::new(Noop)))
    }

    #[test]
    fn test_every_intent_has_steps() {
        for intent in [
            Intent::Impact,
            Intent::Blueprint,
            Intent::Understanding,
            Intent::Documentation,
            Intent::Generic,
        ] {
            assert!(!PipelinePlan::for_intent(intent).steps.is_empty());
        }
    }

    #[test]
    fn test_intent_table() {
        use AgentKind::*;

        let impact = PipelinePlan::for_intent(Intent::Impact);
        assert_eq!(impact.strategy, Strategy::Parallel);
        assert_eq!(impact.steps, vec![Understanding, Impact]);
        assert!(impact.requires_synthesis);

        let blueprint = PipelinePlan::for_intent(Intent::Blueprint);
        assert_eq!(blueprint.strategy, Strategy::Sequence);
        assert_eq!(blueprint.steps, vec![Understanding, Impact, Blueprint]);
        assert!(!blueprint.requires_synthesis);

        let docs = PipelinePlan::for_intent(Intent::Documentation);
        assert_eq!(docs.strategy, Strategy::Sequence);
        assert_eq!(docs.steps, vec![Documentation]);

        let understanding = PipelinePlan::for_intent(Intent::Understanding);
        assert_eq!(understanding.strategy, Strategy::Sequence);
        assert_eq!(understanding.steps, vec![Understanding]);

        let generic = PipelinePlan::for_intent(Intent::Generic);
        assert_eq!(generic.strategy, Strategy::Parallel);
        assert_eq!(generic.steps, vec![Understanding]);
        assert!(!generic.requires_synthesis);
    }

    #[test]
    fn test_override_rules() {
        assert!(requests_impact_documentation("Prepare an Impact Assessment"));
        assert!(requests_impact_documentation("document the impact"));
        assert!(requests_impact_documentation("Generate the impact of X"));
        assert!(!requests_impact_documentation("impact of X"));
        assert!(!requests_impact_documentation("generate docs"));
    }

    #[test]
    fn test_override_takes_precedence_over_intent() {
        let expected = PipelinePlan::impact_documentation();
        for intent in [Intent::Impact, Intent::Generic, Intent::Blueprint] {
            assert_eq!(
                PipelinePlan::select(intent, "generate impact report"),
                expected
            );
        }
        assert!(!expected.requires_synthesis);
        assert_eq!(expected.strategy, Strategy::Sequence);
    }

    #[test]
    fn test_resolve_names_and_synthesizer() {
        let selector = PipelineSelector::new(full_registry());

        let descriptor = selector.select(Intent::Impact, "impact of X").unwrap();
        assert_eq!(
            descriptor.joined_names(),
            "UnderstandingAgent,ImpactAnalyzerAgent"
        );
        assert_eq!(
            descriptor.synthesizer.unwrap().display_name,
            "BlueprintGeneratorAgent"
        );

        let descriptor = selector.select(Intent::Understanding, "why").unwrap();
        assert!(descriptor.synthesizer.is_none());
    }

    #[test]
    fn test_resolve_missing_handler_fails() {
        let registry = AgentRegistry::new().with_handler(AgentKind::Understanding, Arc::new(Noop));
        let selector = PipelineSelector::new(registry);

        assert!(selector.select(Intent::Generic, "hi").is_ok());
        assert!(selector.select(Intent::Impact, "impact").is_err());
    }
}
