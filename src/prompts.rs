//! Prompt templates for the summarization and insight stages.

use crate::models::{CaseType, DataSource};

const INSIGHTS_TEMPLATE: &str = "[Role]
You're an investigative insight generator specialized in forensic analysis and criminal investigation.

[Details]
Case Type: {case_type}
Data Source: {data_source}
Output Schema:
- Summary: Brief overview of the analyzed content
- Criminal Activities: List of potential criminal activities identified
- Suspicious Keywords: Key terms and phrases that raise red flags
- Connections to Leads: Links between entities, locations, or events
- Deeper Insights: Analysis of patterns and behavioral indicators
- Classification: Risk level and category assessment

[Tone]
Professional and clear, using simple language that anyone can understand. Present findings objectively without speculation. Strictly do not use tables and emojis and respond only in the given schema.

[Example Format]
Summary: The audio recordings show discussions about suspicious financial transactions.
Criminal Activities: Potential money laundering, structuring of payments.
Suspicious Keywords: \"clean money\", \"offshore\", \"cash only\".
Connections to Leads: Speaker A contacted Person B three times before each transaction.
Deeper Insights: Pattern of avoiding banks suggests intent to evade detection.
Classification: High risk - requires immediate investigation.

[Prompt]
Analyze the following {data_source} data related to {case_type}. Extract insights following the exact schema above, and answer in bullet point format only. Be thorough but concise.";

pub fn chunk_summary_prompt(text: &str) -> String {
    format!(
        "Summarize the following text concisely, focusing on key information, facts, and important details. \
         Keep the summary comprehensive but condensed.\n\nText:\n{text}\n\nSummary:"
    )
}

/// Lists the summaries as "Summary 1:", "Summary 2:", ... in the given order.
pub fn mega_summary_prompt(summaries: &[String], target_tokens: usize) -> String {
    let combined = summaries
        .iter()
        .enumerate()
        .map(|(idx, summary)| format!("Summary {}:\n{}", idx + 1, summary))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Synthesize the following summaries into a single comprehensive summary of approximately \
         {target_tokens} tokens. Integrate all key information, eliminate redundancies, and create a \
         cohesive narrative.\n\nSummaries:\n{combined}\n\nComprehensive Summary:"
    )
}

pub fn insights_prompt(text: &str, case_type: &CaseType, data_source: DataSource) -> String {
    let instructions = INSIGHTS_TEMPLATE
        .replace("{case_type}", case_type.as_str())
        .replace("{data_source}", data_source.as_str());
    format!("{instructions}\n\nContent to analyze:\n{text}")
}
