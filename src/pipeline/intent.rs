//! 意图识别

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 请求意图，每次请求识别一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Impact,
    Blueprint,
    Understanding,
    Documentation,
    Generic,
}

/// 关键字规则，按优先级排列，首个命中即返回
const KEYWORD_RULES: &[(Intent, &[&str])] = &[
    (
        Intent::Impact,
        &["impact", "change", "affected", "influence", "dependency", "impacted"],
    ),
    (
        Intent::Blueprint,
        &["blueprint", "solution", "design", "architecture", "approach", "pattern"],
    ),
    (
        Intent::Understanding,
        &[
            "understand",
            "explain",
            "challenge",
            "gotcha",
            "clarify",
            "why",
            "functionality",
            "what does",
        ],
    ),
    (
        Intent::Documentation,
        &["document", "documentation", "docs", "doc"],
    ),
];

impl Intent {
    /// 大小写不敏感的关键字匹配
    pub fn classify(text: &str) -> Intent {
        let lowered = text.to_lowercase();
        KEYWORD_RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Generic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Impact => "impact",
            Intent::Blueprint => "blueprint",
            Intent::Understanding => "understanding",
            Intent::Documentation => "documentation",
            Intent::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "impact" => Ok(Intent::Impact),
            "blueprint" => Ok(Intent::Blueprint),
            "understanding" => Ok(Intent::Understanding),
            "documentation" => Ok(Intent::Documentation),
            "generic" => Ok(Intent::Generic),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// 意图识别结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAssessment {
    pub intent: Intent,
    /// LLM识别器给出的一句话摘要
    pub summary: Option<String>,
}

/// 意图识别器
#[async_trait]
pub trait IntentDetector: Send + Sync {
    async fn detect(&self, query: &str) -> IntentAssessment;
}

/// 纯关键字识别器
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

#[async_trait]
impl IntentDetector for KeywordClassifier {
    async fn detect(&self, query: &str) -> IntentAssessment {
        IntentAssessment {
            intent: Intent::classify(query),
            summary: None,
        }
    }
}
