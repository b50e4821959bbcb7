// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Multi-judge evaluation with majority vote.
//!
//! A [`JudgePanel`] asks every configured judge, one after another, to grade
//! a response on the standard metrics plus any custom ones. Each judge
//! yields a [`JudgeVerdict`]; verdicts are then folded into an
//! [`AggregatedVerdict`]:
//!
//! - PASS only when strictly more judges passed than failed
//! - `AVG_<metric>` averaged over the judges that reported the metric
//! - ERROR verdicts are kept for inspection but never vote or score

pub mod prompt;
pub mod scores;

use crate::cost::{round_to, token_cost};
use crate::provider::{InferenceConfig, ProviderError};
use crate::retry::RetryPolicy;
use crate::scenario::JudgeProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub use prompt::EvaluationRequest;
pub use scores::JudgeScores;

/// Metrics every judge grades.
pub const STANDARD_METRICS: [&str; 6] = [
    "Correctness",
    "Completeness",
    "Relevance",
    "Format",
    "Coherence",
    "Following-instructions",
];

/// Inference parameters for judge calls.
pub const JUDGE_INFERENCE_CONFIG: InferenceConfig = InferenceConfig {
    max_tokens: 1500,
    temperature: 0.3,
    top_p: 0.9,
};

/// Outcome of a single judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Judgment {
    /// Every metric scored at least 3
    Pass,
    /// At least one metric scored below 3
    Fail,
    /// No usable scores
    Error,
}

/// Text and usage returned by a judge model.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeReply {
    /// Completion text
    pub text: String,
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
}

/// Non-streaming completion interface used to call judges.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Send `prompt` to the judge model and return its reply.
    async fn complete(
        &self,
        judge: &JudgeProfile,
        prompt: &str,
        config: &InferenceConfig,
    ) -> Result<JudgeReply, ProviderError>;
}

/// One judge's evaluation of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Judge model
    #[serde(rename = "model")]
    pub judge_model_id: String,
    /// Metric scores or the NULL sentinel
    pub scores: JudgeScores,
    /// PASS, FAIL or ERROR
    pub judgment: Judgment,
    /// Failing metrics joined by `;`, or the error message
    pub explanation: String,
    /// Prompt tokens across all calls to this judge
    pub judge_input_tokens: u64,
    /// Completion tokens across all calls to this judge
    pub judge_output_tokens: u64,
    /// Cost of all calls to this judge in USD
    pub judge_cost: f64,
    /// Raw text of the judge's grading answer
    pub full_response: String,
}

impl JudgeVerdict {
    fn error(
        judge: &JudgeProfile,
        explanation: impl Into<String>,
        full_response: String,
        usage: (u64, u64),
    ) -> Self {
        Self {
            judge_model_id: judge.model_id.clone(),
            scores: JudgeScores::null(),
            judgment: Judgment::Error,
            explanation: explanation.into(),
            judge_input_tokens: usage.0,
            judge_output_tokens: usage.1,
            judge_cost: token_cost(
                usage.0,
                usage.1,
                judge.input_cost_per_1k,
                judge.output_cost_per_1k,
            ),
            full_response,
        }
    }
}

/// Verdicts of all judges folded into one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedVerdict {
    /// PASS or FAIL; ties resolve to FAIL
    pub majority_judgment: Judgment,
    /// Distinct explanations of the judges that agreed with the majority
    pub majority_explanations: BTreeSet<String>,
    /// `AVG_<metric>` to mean score, rounded to 4 decimals
    pub majority_score: BTreeMap<String, f64>,
    /// Every verdict, in judge order
    pub judge_details: Vec<JudgeVerdict>,
    /// Sum of all judge costs in USD
    pub total_evaluation_cost: f64,
}

impl AggregatedVerdict {
    /// Fold verdicts by majority vote.
    pub fn from_verdicts(judge_details: Vec<JudgeVerdict>) -> Self {
        let passes = judge_details
            .iter()
            .filter(|v| v.judgment == Judgment::Pass)
            .count();
        let fails = judge_details
            .iter()
            .filter(|v| v.judgment == Judgment::Fail)
            .count();
        let majority_judgment = if passes > fails {
            Judgment::Pass
        } else {
            Judgment::Fail
        };

        let majority_explanations = judge_details
            .iter()
            .filter(|v| v.judgment == majority_judgment && !v.explanation.is_empty())
            .map(|v| v.explanation.clone())
            .collect();

        let mut sums: BTreeMap<&str, (i64, u32)> = BTreeMap::new();
        for scores in judge_details.iter().filter_map(|v| v.scores.metrics()) {
            for (metric, score) in scores {
                let entry = sums.entry(metric.as_str()).or_default();
                entry.0 += *score;
                entry.1 += 1;
            }
        }
        let majority_score = sums
            .into_iter()
            .map(|(metric, (sum, n))| {
                (
                    format!("AVG_{}", metric),
                    round_to(sum as f64 / f64::from(n), 4),
                )
            })
            .collect();

        let total_evaluation_cost = judge_details.iter().map(|v| v.judge_cost).sum();

        Self {
            majority_judgment,
            majority_explanations,
            majority_score,
            judge_details,
            total_evaluation_cost,
        }
    }

    /// True when no judge produced a PASS or FAIL.
    pub fn all_errored(&self) -> bool {
        self.judge_details
            .iter()
            .all(|v| v.judgment == Judgment::Error)
    }

    /// Majority explanations joined by `;`.
    pub fn joined_explanation(&self) -> String {
        self.majority_explanations
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Panel of judges sharing one client and retry policy.
#[derive(Clone)]
pub struct JudgePanel {
    client: Arc<dyn JudgeClient>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for JudgePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgePanel")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl JudgePanel {
    /// Create a panel.
    pub fn new(client: Arc<dyn JudgeClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Standard metrics followed by the custom ones.
    pub fn metric_set(custom_metrics: &[String]) -> Vec<String> {
        STANDARD_METRICS
            .iter()
            .map(|m| m.to_string())
            .chain(custom_metrics.iter().cloned())
            .collect()
    }

    /// Grade a response with every judge, sequentially, and aggregate.
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest<'_>,
        judges: &[JudgeProfile],
        custom_metrics: &[String],
    ) -> AggregatedVerdict {
        let metrics = Self::metric_set(custom_metrics);
        let grading_prompt = prompt::evaluation_prompt(&metrics, request);

        let mut verdicts = Vec::with_capacity(judges.len());
        for judge in judges {
            let verdict = self.judge_once(judge, &metrics, &grading_prompt).await;
            if verdict.judgment == Judgment::Error {
                warn!(
                    judge = %judge.model_id,
                    explanation = %verdict.explanation,
                    "judge returned no usable verdict"
                );
            } else {
                debug!(judge = %judge.model_id, judgment = ?verdict.judgment, "judge verdict");
            }
            verdicts.push(verdict);
        }

        AggregatedVerdict::from_verdicts(verdicts)
    }

    async fn call(&self, judge: &JudgeProfile, prompt: &str) -> Result<JudgeReply, ProviderError> {
        let label = format!("judge {}", judge.model_id);
        let (reply, _) = self
            .retry
            .run(&label, || {
                self.client
                    .complete(judge, prompt, &JUDGE_INFERENCE_CONFIG)
            })
            .await?;
        Ok(reply)
    }

    async fn judge_once(
        &self,
        judge: &JudgeProfile,
        metrics: &[String],
        grading_prompt: &str,
    ) -> JudgeVerdict {
        let reply = match self.call(judge, grading_prompt).await {
            Ok(reply) => reply,
            Err(e) => return JudgeVerdict::error(judge, e.to_string(), String::new(), (0, 0)),
        };
        let mut usage = (reply.input_tokens, reply.output_tokens);

        let scores = match scores::extract_scores(&reply.text) {
            Some(scores) => scores,
            None => {
                debug!(judge = %judge.model_id, "score block not found, asking judge to repair");
                let repair = prompt::repair_prompt(metrics, &reply.text);
                match self.call(judge, &repair).await {
                    Ok(fixed) => {
                        usage.0 += fixed.input_tokens;
                        usage.1 += fixed.output_tokens;
                        match scores::extract_scores(&fixed.text) {
                            Some(scores) => scores,
                            None => {
                                return JudgeVerdict::error(
                                    judge,
                                    "JSON NOT FOUND",
                                    reply.text,
                                    usage,
                                )
                            }
                        }
                    }
                    Err(e) => return JudgeVerdict::error(judge, e.to_string(), reply.text, usage),
                }
            }
        };

        let failing = scores::failing_metrics(&scores);
        let judgment = if failing.is_empty() {
            Judgment::Pass
        } else {
            Judgment::Fail
        };
        let explanation = failing.join(";");

        JudgeVerdict {
            judge_model_id: judge.model_id.clone(),
            judgment,
            explanation,
            scores: JudgeScores::Metrics(scores),
            judge_input_tokens: usage.0,
            judge_output_tokens: usage.1,
            judge_cost: token_cost(usage.0, usage.1, judge.input_cost_per_1k, judge.output_cost_per_1k),
            full_response: reply.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn judge(id: &str) -> JudgeProfile {
        JudgeProfile {
            model_id: id.to_string(),
            region: "us-east-1".to_string(),
            input_cost_per_1k: 1.0,
            output_cost_per_1k: 2.0,
        }
    }

    fn reply(text: &str) -> JudgeReply {
        JudgeReply {
            text: text.to_string(),
            input_tokens: 100,
            output_tokens: 50,
        }
    }

    fn verdict(judgment: Judgment, scores: &[(&str, i64)]) -> JudgeVerdict {
        let scores = if judgment == Judgment::Error {
            JudgeScores::null()
        } else {
            JudgeScores::Metrics(scores.iter().map(|(m, s)| (m.to_string(), *s)).collect())
        };
        JudgeVerdict {
            judge_model_id: "j".into(),
            scores,
            judgment,
            explanation: match judgment {
                Judgment::Fail => "Format".into(),
                _ => String::new(),
            },
            judge_input_tokens: 0,
            judge_output_tokens: 0,
            judge_cost: 0.5,
            full_response: String::new(),
        }
    }

    fn request() -> EvaluationRequest<'static> {
        EvaluationRequest {
            prompt: "What is 2+2?",
            response: "4",
            golden_answer: "4",
            task_types: "Math",
            task_criteria: "Exact",
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2), false)
    }

    #[test]
    fn test_tie_resolves_to_fail() {
        let agg = AggregatedVerdict::from_verdicts(vec![
            verdict(Judgment::Pass, &[("Correctness", 5)]),
            verdict(Judgment::Fail, &[("Correctness", 2)]),
        ]);
        assert_eq!(agg.majority_judgment, Judgment::Fail);
        assert_eq!(agg.joined_explanation(), "Format");
    }

    #[test]
    fn test_majority_pass() {
        let agg = AggregatedVerdict::from_verdicts(vec![
            verdict(Judgment::Pass, &[]),
            verdict(Judgment::Pass, &[]),
            verdict(Judgment::Fail, &[]),
        ]);
        assert_eq!(agg.majority_judgment, Judgment::Pass);
        assert!(agg.majority_explanations.is_empty());
        assert!((agg.total_evaluation_cost - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_errors_do_not_vote_or_score() {
        let agg = AggregatedVerdict::from_verdicts(vec![
            verdict(Judgment::Pass, &[("Correctness", 4), ("Format", 3)]),
            verdict(Judgment::Error, &[]),
            verdict(Judgment::Pass, &[("Correctness", 5)]),
        ]);
        assert_eq!(agg.majority_judgment, Judgment::Pass);
        assert_eq!(agg.majority_score["AVG_Correctness"], 4.5);
        assert_eq!(agg.majority_score["AVG_Format"], 3.0);
        assert_eq!(agg.judge_details.len(), 3);
        assert!(!agg.all_errored());
    }

    #[test]
    fn test_average_rounds_to_four_places() {
        let agg = AggregatedVerdict::from_verdicts(vec![
            verdict(Judgment::Pass, &[("Coherence", 4)]),
            verdict(Judgment::Pass, &[("Coherence", 4)]),
            verdict(Judgment::Pass, &[("Coherence", 5)]),
        ]);
        assert_eq!(agg.majority_score["AVG_Coherence"], 4.3333);
    }

    #[test]
    fn test_empty_panel_fails() {
        let agg = AggregatedVerdict::from_verdicts(vec![]);
        assert_eq!(agg.majority_judgment, Judgment::Fail);
        assert!(agg.all_errored());
    }

    #[tokio::test]
    async fn test_panel_grades_and_charges_cost() {
        let mut client = MockJudgeClient::new();
        client
            .expect_complete()
            .withf(|j, _, cfg| j.model_id == "judge-a" && cfg.max_tokens == 1500)
            .times(1)
            .returning(|_, _, _| {
                Ok(reply(r#"{"scores": {"Correctness": 5, "Format": 2}}"#))
            });
        client
            .expect_complete()
            .withf(|j, _, _| j.model_id == "judge-b")
            .times(1)
            .returning(|_, _, _| Ok(reply(r#"Sure. {"scores": {"Correctness": 4, "Format": 4}}"#)));

        let panel = JudgePanel::new(Arc::new(client), fast_retry());
        let agg = panel
            .evaluate(&request(), &[judge("judge-a"), judge("judge-b")], &[])
            .await;

        assert_eq!(agg.majority_judgment, Judgment::Fail);
        assert_eq!(agg.judge_details[0].judgment, Judgment::Fail);
        assert_eq!(agg.judge_details[0].explanation, "Format");
        assert_eq!(agg.judge_details[1].judgment, Judgment::Pass);
        assert_eq!(agg.majority_score["AVG_Format"], 3.0);
        // 100 in at $1/1k + 50 out at $2/1k per judge
        assert!((agg.total_evaluation_cost - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_score_fails_the_verdict() {
        let mut client = MockJudgeClient::new();
        client
            .expect_complete()
            .times(1)
            .returning(|_, _, _| Ok(reply(r#"{"scores": {"Correctness": 0, "Format": 4}}"#)));

        let panel = JudgePanel::new(Arc::new(client), fast_retry());
        let agg = panel.evaluate(&request(), &[judge("j")], &[]).await;

        let v = &agg.judge_details[0];
        assert_eq!(v.judgment, Judgment::Fail);
        assert_eq!(v.explanation, "Correctness");
        assert_eq!(agg.majority_judgment, Judgment::Fail);
        assert_eq!(agg.majority_score["AVG_Correctness"], 0.0);
    }

    #[tokio::test]
    async fn test_repair_call_recovers_scores() {
        let mut client = MockJudgeClient::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(reply("Correctness is five out of five.")));
        client
            .expect_complete()
            .withf(|_, prompt, _| prompt.starts_with("## Instruction"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(reply(r#"{"scores": {"Correctness": 5}}"#)));

        let panel = JudgePanel::new(Arc::new(client), fast_retry());
        let agg = panel.evaluate(&request(), &[judge("j")], &[]).await;

        let v = &agg.judge_details[0];
        assert_eq!(v.judgment, Judgment::Pass);
        assert_eq!(v.judge_input_tokens, 200);
        assert_eq!(v.full_response, "Correctness is five out of five.");
    }

    #[tokio::test]
    async fn test_failed_repair_yields_error_verdict() {
        let mut client = MockJudgeClient::new();
        client
            .expect_complete()
            .times(2)
            .returning(|_, _, _| Ok(reply("no scores at all")));

        let panel = JudgePanel::new(Arc::new(client), fast_retry());
        let agg = panel.evaluate(&request(), &[judge("j")], &[]).await;

        let v = &agg.judge_details[0];
        assert_eq!(v.judgment, Judgment::Error);
        assert_eq!(v.scores, JudgeScores::null());
        assert_eq!(v.explanation, "JSON NOT FOUND");
        assert!(v.judge_cost > 0.0);
        assert!(agg.all_errored());
    }

    #[tokio::test]
    async fn test_failed_call_yields_error_verdict() {
        let mut client = MockJudgeClient::new();
        client
            .expect_complete()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::from_code("AccessDeniedException", "no access")));

        let panel = JudgePanel::new(Arc::new(client), fast_retry());
        let agg = panel
            .evaluate(&request(), &[judge("j")], &["brand-voice".to_string()])
            .await;

        let v = &agg.judge_details[0];
        assert_eq!(v.judgment, Judgment::Error);
        assert_eq!(v.explanation, "AccessDeniedException no access");
        assert_eq!(v.judge_cost, 0.0);
    }

    #[tokio::test]
    async fn test_custom_metrics_reach_the_prompt() {
        let mut client = MockJudgeClient::new();
        client
            .expect_complete()
            .withf(|_, prompt, _| prompt.contains("- brand-voice"))
            .times(1)
            .returning(|_, _, _| Ok(reply(r#"{"scores": {"brand-voice": 3}}"#)));

        let panel = JudgePanel::new(Arc::new(client), fast_retry());
        let agg = panel
            .evaluate(&request(), &[judge("j")], &["brand-voice".to_string()])
            .await;
        assert_eq!(agg.majority_score["AVG_brand-voice"], 3.0);
    }
}
