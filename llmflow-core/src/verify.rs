//! Verification — the three-way sufficiency decision.
//!
//! After each search pass the engine asks the LLM whether the
//! accumulated findings answer the query. The reply is classified into
//! a tagged verdict; LLM output is treated leniently (keyword scan with
//! an `insufficient` default) since completions rarely match a rigid
//! format.

use crate::task::Finding;
use serde::{Deserialize, Serialize};

/// Outcome of the verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Findings sufficiently and consistently answer the query.
    Sufficient,
    /// More searching is needed; `gaps` seed the next plan.
    Insufficient { gaps: Vec<String> },
    /// Sources conflict; `conflicts` seed targeted follow-up queries.
    Contradictory { conflicts: Vec<String> },
}

impl Verdict {
    /// Classify an LLM completion into a verdict.
    ///
    /// Expected reply shape: a leading `SUFFICIENT` / `INSUFFICIENT` /
    /// `CONTRADICTORY` keyword, optionally followed by `gap:` or
    /// `conflict:` lines. Anything unrecognized is treated as
    /// insufficient so the loop keeps searching rather than stopping
    /// on garbage.
    pub fn parse(response: &str) -> Verdict {
        let lower = response.to_lowercase();

        if lower.contains("contradictory") || lower.contains("contradiction") {
            return Verdict::Contradictory {
                conflicts: extract_items(response, "conflict:"),
            };
        }
        // "insufficient" contains "sufficient", so check it first.
        if lower.contains("insufficient") {
            return Verdict::Insufficient {
                gaps: extract_items(response, "gap:"),
            };
        }
        if lower.contains("sufficient") {
            return Verdict::Sufficient;
        }

        Verdict::Insufficient { gaps: Vec::new() }
    }

    /// Gap or conflict descriptions that seed the next planning pass.
    pub fn follow_up_gaps(&self) -> &[String] {
        match self {
            Verdict::Sufficient => &[],
            Verdict::Insufficient { gaps } => gaps,
            Verdict::Contradictory { conflicts } => conflicts,
        }
    }
}

/// Extract `prefix`-tagged lines from an LLM reply.
fn extract_items(response: &str, prefix: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let lower = line.to_lowercase();
            lower
                .starts_with(prefix)
                .then(|| line[prefix.len()..].trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Build the verification prompt from the query and current findings.
pub fn verification_prompt(query: &str, findings: &[Finding]) -> String {
    let mut prompt = format!(
        "You are verifying research results.\n\
         Query: {query}\n\n\
         Findings so far:\n"
    );
    if findings.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for finding in findings {
            prompt.push_str(&format!("- {} [{}]\n", finding.text, finding.url));
        }
    }
    prompt.push_str(
        "\nDo these findings sufficiently and consistently answer the query?\n\
         Answer with exactly one of: SUFFICIENT, INSUFFICIENT, CONTRADICTORY.\n\
         If INSUFFICIENT, list missing aspects as lines starting with 'gap:'.\n\
         If CONTRADICTORY, list conflicting claims as lines starting with 'conflict:'.\n",
    );
    prompt
}
