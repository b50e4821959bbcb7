// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prompt templates sent to judge models.

/// What a judge is asked to grade.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    /// Prompt the target model answered
    pub prompt: &'a str,
    /// Target model's response
    pub response: &'a str,
    /// Reference answer
    pub golden_answer: &'a str,
    /// Task category
    pub task_types: &'a str,
    /// Grading criteria
    pub task_criteria: &'a str,
}

fn schema_block(metrics: &[String]) -> String {
    let entries: Vec<String> = metrics
        .iter()
        .map(|m| format!("    \"{}\": <int>", m))
        .collect();
    format!("{{\n  \"scores\": {{\n{}\n  }}\n}}", entries.join(",\n"))
}

/// Build the grading prompt for one judge call.
pub fn evaluation_prompt(metrics: &[String], request: &EvaluationRequest<'_>) -> String {
    let metric_list: String = metrics.iter().map(|m| format!("- {m}\n")).collect();
    format!(
        "## You are an expert evaluator.\n\
         # Task: {task}\n\n\
         # Task description: {criteria}\n\n\
         # Original Prompt:\n{prompt}\n\n\
         # Model Response:\n{response}\n\n\
         # Golden (Reference) Response:\n{golden}\n\n\
         # Please evaluate the model response on the following metrics:\n\
         {metric_list}\n\
         # For each metric, assign an integer score from 1 (worst) to 5 (best).\n\n\
         ## IMPORTANT: **Output JSON only** in this format:\n\
         ```json\n{schema}\n```",
        task = request.task_types,
        criteria = request.task_criteria,
        prompt = request.prompt,
        response = request.response,
        golden = request.golden_answer,
        schema = schema_block(metrics),
    )
}

/// Build the follow-up prompt asking a judge to re-emit only the score
/// block from its previous answer.
pub fn repair_prompt(metrics: &[String], previous: &str) -> String {
    format!(
        "## Instruction\n\
         Extract and return the JSON object from the given text that matches the \
         specified JSON schema. The schema is:\n\
         ```json\n{}\n```\n\
         ## Text\n{}\n\n\
         Provide your response immediately without any preamble or additional information.",
        schema_block(metrics),
        previous
    )
}
